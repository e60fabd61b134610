use std::fmt;

use serde::{Deserialize, Serialize};

/// On-object layout version of a reference tracker.
///
/// Stored big-endian in the `schema-version` attribute. The value selects how
/// the object body and key map are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// Refcount in the body, keys in the object map.
    pub const V1: SchemaVersion = SchemaVersion(1);

    /// Version written by new trackers.
    pub const CURRENT: SchemaVersion = Self::V1;

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u32> for SchemaVersion {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Store-assigned write generation of an object.
///
/// Every committed write transaction gives the object a new token. Tokens are
/// only ever compared for equality; a write conditioned on a stale token is
/// rejected by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcurrencyToken(u64);

impl ConcurrencyToken {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen:{}", self.0)
    }
}
