//! Public tracker operations.
//!
//! [`ReferenceTracker`] wraps an injected [`ObjectStore`] and exposes the two
//! protocol entry points, `add` and `remove`, plus read-only helpers. Every
//! call is a fresh interaction with the store: the tracker holds no state
//! between calls and never retries. Callers that need a successful outcome
//! under contention re-issue the operation when
//! [`TrackerError::is_retryable`] is true.

use rt_store::ObjectStore;
use rt_types::{KeySet, SchemaVersion, TrackerId};
use tracing::{debug, info};

use crate::error::{Result, TrackerError};
use crate::layout::{current_layout, layout_for};
use crate::resolver;
use crate::types::{AddOutcome, RemoveOutcome, Snapshot, TrackerState};

/// Key-based reference tracker bound to an object store.
#[derive(Debug, Clone)]
pub struct ReferenceTracker<S> {
    store: S,
}

impl<S: ObjectStore> ReferenceTracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Atomically add `keys` to the tracker `pool/name`.
    ///
    /// Creates the tracker if it does not exist. Keys that are already
    /// tracked are skipped, so repeating a call is a no-op.
    pub fn add(&self, pool: &str, name: &str, keys: &KeySet) -> Result<AddOutcome> {
        let id = TrackerId::new(pool, name)?;
        if keys.is_empty() {
            return Err(TrackerError::EmptyKeySet);
        }
        info!(tracker = %id, count = keys.len(), keys = %keys.joined(), "rt add");

        let outcome = match resolver::resolve_version(&self.store, &id)? {
            None => {
                info!(tracker = %id, "no tracker yet; creating it with the requested keys");
                current_layout().create(&self.store, &id, keys)?
            }
            Some(version) => layout_for(&id, version)?.add(&self.store, &id, keys)?,
        };
        debug!(tracker = %id, ?outcome, "rt add done");
        Ok(outcome)
    }

    /// Atomically remove `keys` from the tracker `pool/name`.
    ///
    /// Deletes the tracker object when its last key is removed. Removing
    /// from a tracker that does not exist succeeds with `deleted = true`.
    pub fn remove(&self, pool: &str, name: &str, keys: &KeySet) -> Result<RemoveOutcome> {
        let id = TrackerId::new(pool, name)?;
        if keys.is_empty() {
            return Err(TrackerError::EmptyKeySet);
        }
        info!(tracker = %id, count = keys.len(), keys = %keys.joined(), "rt remove");

        let outcome = match resolver::resolve_version(&self.store, &id)? {
            None => {
                info!(tracker = %id, "no tracker; assuming it was already deleted");
                RemoveOutcome {
                    deleted: true,
                    removed: 0,
                }
            }
            Some(version) => layout_for(&id, version)?.remove(&self.store, &id, keys)?,
        };
        debug!(tracker = %id, ?outcome, "rt remove done");
        Ok(outcome)
    }

    /// Schema version of the tracker, or `None` if it does not exist.
    pub fn resolve_version(&self, pool: &str, name: &str) -> Result<Option<SchemaVersion>> {
        let id = TrackerId::new(pool, name)?;
        resolver::resolve_version(&self.store, &id)
    }

    /// Refcount, token and membership of `candidates`, or `None` if the
    /// tracker does not exist.
    pub fn read(&self, pool: &str, name: &str, candidates: &KeySet) -> Result<Option<Snapshot>> {
        let id = TrackerId::new(pool, name)?;
        let Some(version) = resolver::resolve_version(&self.store, &id)? else {
            return Ok(None);
        };
        match layout_for(&id, version)?.read(&self.store, &id, None, candidates) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(TrackerError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Full decoded state, or `None` if the tracker does not exist.
    pub fn inspect(&self, pool: &str, name: &str) -> Result<Option<TrackerState>> {
        let id = TrackerId::new(pool, name)?;
        let Some(version) = resolver::resolve_version(&self.store, &id)? else {
            return Ok(None);
        };
        layout_for(&id, version)?.inspect(&self.store, &id)
    }
}

/// Add `keys` to `pool/name` using `store`. See [`ReferenceTracker::add`].
pub fn rt_add<S: ObjectStore>(
    store: S,
    pool: &str,
    name: &str,
    keys: &KeySet,
) -> Result<AddOutcome> {
    ReferenceTracker::new(store).add(pool, name, keys)
}

/// Remove `keys` from `pool/name` using `store`. See [`ReferenceTracker::remove`].
pub fn rt_remove<S: ObjectStore>(
    store: S,
    pool: &str,
    name: &str,
    keys: &KeySet,
) -> Result<RemoveOutcome> {
    ReferenceTracker::new(store).remove(pool, name, keys)
}
