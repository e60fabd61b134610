//! Dispatch over on-object layouts.
//!
//! Each schema version is a [`Layout`] that owns its encoding and its
//! read/modify/write logic. Adding a layout means adding an implementation
//! and an arm in [`layout_for`]; existing layouts are untouched.

use rt_store::ObjectStore;
use rt_types::{ConcurrencyToken, KeySet, SchemaVersion, TrackerId};

use crate::error::{Result, TrackerError};
use crate::types::{AddOutcome, RemoveOutcome, Snapshot, TrackerState};
use crate::v1::V1Layout;

/// Version-specific tracker logic.
///
/// Implementations never retry: a failed precondition is reported as
/// [`TrackerError::Conflict`] and left to the caller.
pub trait Layout: Send + Sync {
    /// The schema version this layout reads and writes.
    fn version(&self) -> SchemaVersion;

    /// Create a new tracker holding exactly `keys`.
    ///
    /// Must fail with `Conflict` if the object already exists.
    fn create(&self, store: &dyn ObjectStore, id: &TrackerId, keys: &KeySet) -> Result<AddOutcome>;

    /// Read refcount, token and membership of `candidates` in one atomic read.
    fn read(
        &self,
        store: &dyn ObjectStore,
        id: &TrackerId,
        expected: Option<ConcurrencyToken>,
        candidates: &KeySet,
    ) -> Result<Snapshot>;

    /// Add the untracked subset of `keys` to an existing tracker.
    fn add(&self, store: &dyn ObjectStore, id: &TrackerId, keys: &KeySet) -> Result<AddOutcome>;

    /// Remove the tracked subset of `keys`, deleting the tracker at zero.
    fn remove(&self, store: &dyn ObjectStore, id: &TrackerId, keys: &KeySet)
        -> Result<RemoveOutcome>;

    /// Decode the whole tracker, or `None` if it vanished.
    fn inspect(&self, store: &dyn ObjectStore, id: &TrackerId) -> Result<Option<TrackerState>>;
}

static V1: V1Layout = V1Layout;

/// Select the layout for a resolved schema version.
pub fn layout_for(id: &TrackerId, version: SchemaVersion) -> Result<&'static dyn Layout> {
    match version {
        SchemaVersion::V1 => Ok(&V1),
        other => Err(TrackerError::UnsupportedVersion {
            id: id.clone(),
            version: other,
        }),
    }
}

/// Layout used for newly created trackers.
pub fn current_layout() -> &'static dyn Layout {
    &V1
}
