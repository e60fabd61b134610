//! Key-based reference trackers on a transactional object store.
//!
//! A reference tracker (RT) is a reference counter where every increment
//! and decrement is tagged with an opaque key. Re-applying a key is a no-op,
//! which makes accounting safe under retries, duplicate requests and
//! concurrent writers on different nodes.
//!
//! # Protocol
//!
//! - The tracker is one object. A `schema-version` attribute selects the
//!   layout; version 1 keeps the refcount in the body and the keys in the
//!   object map.
//! - `add` creates the object with an exclusive create, or reads it and
//!   writes the missing keys conditioned on the version it read.
//! - `remove` writes the decremented state under the same condition, or
//!   deletes the object when the refcount would reach zero.
//! - A failed condition is [`TrackerError::Conflict`]. Nothing retries
//!   internally; callers decide.
//!
//! # Modules
//!
//! - [`codec`]: Big-endian encodings of the version and refcount
//! - [`resolver`]: Schema version lookup
//! - [`layout`]: The [`Layout`] trait and version dispatch
//! - [`v1`]: Version 1 reader and mutator
//! - [`tracker`]: [`ReferenceTracker`], [`rt_add`], [`rt_remove`]

pub mod codec;
pub mod error;
pub mod layout;
pub mod resolver;
pub mod tracker;
pub mod types;
pub mod v1;

pub use error::{Result, TrackerError};
pub use layout::{layout_for, Layout};
pub use resolver::{resolve_version, VERSION_XATTR};
pub use tracker::{rt_add, rt_remove, ReferenceTracker};
pub use types::{AddOutcome, RemoveOutcome, Snapshot, TrackerState};
pub use v1::V1Layout;
