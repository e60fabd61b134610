//! Transactional object storage for reference trackers.
//!
//! The tracker protocol needs an object store that offers per-object
//! extended attributes, a key-value object map ("omap"), and atomic read and
//! write transactions guarded by preconditions. This crate defines that
//! contract and ships two backends for it.
//!
//! # Transactions
//!
//! - [`WriteOp`] -- optional [`Precondition`] plus ordered [`WriteStep`]s,
//!   applied all-or-nothing
//! - [`ReadOp`] -- optional version assertion, body read, attribute reads and
//!   object-map lookups observed at a single version
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`DirObjectStore`] -- one JSON file per object, lock files for writers
//!
//! # Design Rules
//!
//! 1. A failed precondition aborts the whole transaction.
//! 2. Every committed write gets a fresh version; versions are never reused.
//! 3. The store never interprets object contents.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod dir;
pub mod error;
pub mod memory;
pub mod object;
pub mod op;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use dir::{DirObjectStore, LockConfig};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::StoredObject;
pub use op::{OmapRead, Precondition, ReadOp, ReadResult, WriteOp, WriteResult, WriteStep};
pub use traits::ObjectStore;
