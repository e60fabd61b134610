//! Outcome and state types returned by tracker operations.

use rt_types::{ConcurrencyToken, KeySet, SchemaVersion};
use serde::Serialize;

/// Result of a successful `add`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    /// This call created the tracker object.
    pub created: bool,
    /// Number of keys actually written (0 for an idempotent repeat).
    pub added: usize,
}

/// Result of a successful `remove`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RemoveOutcome {
    /// The tracker object no longer exists after this call.
    pub deleted: bool,
    /// Number of keys actually removed.
    pub removed: usize,
}

/// What a version-specific reader saw in one atomic read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Reference count stored in the body.
    pub refcount: u32,
    /// Object version at read time; the precondition for the next write.
    pub token: ConcurrencyToken,
    /// Membership of each candidate key, in candidate iteration order.
    pub found: Vec<bool>,
}

/// Full decoded state of a tracker, as returned by `inspect`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackerState {
    pub schema_version: SchemaVersion,
    pub refcount: u32,
    pub token: ConcurrencyToken,
    pub keys: KeySet,
}

impl TrackerState {
    /// `refcount` equals the number of tracked keys.
    pub fn is_consistent(&self) -> bool {
        usize::try_from(self.refcount).map_or(false, |n| n == self.keys.len())
    }
}
