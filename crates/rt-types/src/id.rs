use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Address of a tracker object: the pool (namespace) and the object name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackerId {
    pub pool: String,
    pub name: String,
}

impl TrackerId {
    /// Build an id after validating both components.
    pub fn new(pool: impl Into<String>, name: impl Into<String>) -> Result<Self, TypeError> {
        let pool = pool.into();
        let name = name.into();
        validate_component("pool", &pool)?;
        validate_component("object", &name)?;
        Ok(Self { pool, name })
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pool, self.name)
    }
}

/// Validate a pool or object name.
///
/// Names must be non-empty and must not contain `/`, NUL, or be `.`/`..`,
/// so they can double as file names in directory-backed stores.
pub fn validate_component(kind: &'static str, name: &str) -> Result<(), TypeError> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name == "." || name == ".." {
        Some("reserved name")
    } else if name.contains('/') {
        Some("must not contain '/'")
    } else if name.contains('\0') {
        Some("must not contain NUL")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(TypeError::InvalidName {
            kind,
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
