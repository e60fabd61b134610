use rt_types::{ConcurrencyToken, TypeError};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The pool does not exist.
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    /// The requested object was not found.
    #[error("object not found: {pool}/{oid}")]
    NotFound { pool: String, oid: String },

    /// The object exists but carries no attribute with this name.
    #[error("no attribute {name:?} on {pool}/{oid}")]
    NoAttribute {
        pool: String,
        oid: String,
        name: String,
    },

    /// An exclusive create found the object already present.
    #[error("object already exists: {pool}/{oid}")]
    AlreadyExists { pool: String, oid: String },

    /// A version precondition failed.
    #[error("version mismatch on {pool}/{oid}: expected {expected}, found {actual}")]
    VersionMismatch {
        pool: String,
        oid: String,
        expected: ConcurrencyToken,
        actual: ConcurrencyToken,
    },

    /// The object is locked by another writer and the lock could not be taken.
    #[error("object busy: {pool}/{oid}")]
    Busy { pool: String, oid: String },

    /// Persisted object data could not be decoded.
    #[error("corrupt object {pool}/{oid}: {reason}")]
    Corrupt {
        pool: String,
        oid: String,
        reason: String,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Pool or object name rejected.
    #[error(transparent)]
    InvalidName(#[from] TypeError),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` if a write precondition was not met.
    ///
    /// A version assertion against a deleted object surfaces as `NotFound`,
    /// so it counts as a failed precondition too.
    pub fn is_precondition_failure(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists { .. } | Self::VersionMismatch { .. } | Self::NotFound { .. }
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
