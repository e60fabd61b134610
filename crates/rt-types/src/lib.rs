//! Foundation types for key-based reference trackers.
//!
//! A reference tracker is a reference counter that counts *keys* instead of
//! bare increments: adding a key twice is the same as adding it once. This
//! crate holds the vocabulary shared by the store adapters, the tracker
//! protocol and the CLI.
//!
//! # Key Types
//!
//! - [`RefKey`]: Opaque byte-string identifying a single reference
//! - [`KeySet`]: Deduplicated, ordered set of reference keys
//! - [`SchemaVersion`]: On-object layout version stored in an attribute
//! - [`ConcurrencyToken`]: Store-assigned write generation used for CAS
//! - [`TrackerId`]: (pool, object name) pair addressing a tracker

pub mod error;
pub mod id;
pub mod key;
pub mod version;

pub use error::TypeError;
pub use id::{validate_component, TrackerId};
pub use key::{KeySet, RefKey};
pub use version::{ConcurrencyToken, SchemaVersion};
