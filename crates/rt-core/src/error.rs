//! Error types for tracker operations.

use rt_store::StoreError;
use rt_types::{SchemaVersion, TrackerId, TypeError};
use thiserror::Error;

use crate::codec::CodecError;

/// Errors that can occur during tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The tracker object is absent where the operation needed it.
    #[error("tracker not found: {id}")]
    NotFound { id: TrackerId },

    /// Another writer changed the tracker between this call's read and
    /// write, or won a creation race. Re-issue the whole operation.
    #[error("concurrent modification of tracker {id}; retry the operation")]
    Conflict { id: TrackerId },

    /// The tracker uses a layout this build does not understand.
    #[error("tracker {id} has unsupported schema version {version}")]
    UnsupportedVersion { id: TrackerId, version: SchemaVersion },

    /// On-object data could not be decoded or is inconsistent.
    #[error("corrupt tracker {id}: {reason}")]
    Corrupt { id: TrackerId, reason: String },

    /// Adding would exceed the maximum representable refcount.
    #[error("refcount overflow on tracker {id}")]
    RefcountOverflow { id: TrackerId },

    /// The caller passed no keys.
    #[error("key set must not be empty")]
    EmptyKeySet,

    /// Pool or tracker name rejected.
    #[error(transparent)]
    InvalidName(#[from] TypeError),

    /// Any other failure from the object store, propagated verbatim.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TrackerError {
    /// Returns `true` if re-issuing the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Store(StoreError::Busy { .. })
        )
    }

    pub(crate) fn corrupt(id: &TrackerId, err: CodecError) -> Self {
        Self::Corrupt {
            id: id.clone(),
            reason: err.to_string(),
        }
    }
}

/// Convenience type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
