use std::collections::BTreeMap;

use rt_types::ConcurrencyToken;

use crate::error::{StoreError, StoreResult};
use crate::op::{OmapRead, Precondition, ReadOp, ReadResult, WriteOp, WriteResult, WriteStep};

/// A stored object: version, body, extended attributes and object map.
///
/// `StoredObject` is the unit of storage shared by every backend. Backends
/// only decide where objects live and how transactions are serialized; the
/// transaction semantics themselves are implemented here once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Store-assigned write generation.
    pub version: ConcurrencyToken,
    /// Object body bytes.
    pub body: Vec<u8>,
    /// Extended attributes.
    pub xattrs: BTreeMap<String, Vec<u8>>,
    /// Key-value object map.
    pub omap: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl StoredObject {
    /// An empty object at `version`.
    pub fn empty(version: ConcurrencyToken) -> Self {
        Self {
            version,
            body: Vec::new(),
            xattrs: BTreeMap::new(),
            omap: BTreeMap::new(),
        }
    }

    /// Execute a read transaction against this object.
    pub fn read(&self, pool: &str, oid: &str, op: &ReadOp) -> StoreResult<ReadResult> {
        if let Some(expected) = op.version_assertion() {
            if expected != self.version {
                return Err(StoreError::VersionMismatch {
                    pool: pool.to_string(),
                    oid: oid.to_string(),
                    expected,
                    actual: self.version,
                });
            }
        }

        let body = match op.body_len() {
            Some(len) => self.body[..len.min(self.body.len())].to_vec(),
            None => Vec::new(),
        };

        let xattrs = op
            .xattrs()
            .iter()
            .filter_map(|name| self.xattrs.get(name).map(|v| (name.clone(), v.clone())))
            .collect();

        let omap = match op.omap() {
            OmapRead::Nothing => BTreeMap::new(),
            OmapRead::Keys(keys) => keys
                .iter()
                .filter_map(|k| self.omap.get(k).map(|v| (k.clone(), v.clone())))
                .collect(),
            OmapRead::All => self.omap.clone(),
        };

        Ok(ReadResult {
            version: self.version,
            body,
            xattrs,
            omap,
        })
    }
}

/// Check a write precondition against the current state of an object slot.
pub fn check_precondition(
    pool: &str,
    oid: &str,
    current: Option<&StoredObject>,
    precondition: Option<Precondition>,
) -> StoreResult<()> {
    match (precondition, current) {
        (None, _) => Ok(()),
        (Some(Precondition::NotExists), None) => Ok(()),
        (Some(Precondition::NotExists), Some(_)) => Err(StoreError::AlreadyExists {
            pool: pool.to_string(),
            oid: oid.to_string(),
        }),
        (Some(Precondition::VersionIs(_)), None) => Err(StoreError::NotFound {
            pool: pool.to_string(),
            oid: oid.to_string(),
        }),
        (Some(Precondition::VersionIs(expected)), Some(obj)) if obj.version != expected => {
            Err(StoreError::VersionMismatch {
                pool: pool.to_string(),
                oid: oid.to_string(),
                expected,
                actual: obj.version,
            })
        }
        (Some(Precondition::VersionIs(_)), Some(_)) => Ok(()),
    }
}

/// Apply a write transaction to an object slot and return the new slot.
///
/// The input is never modified, so a failing step leaves the caller's copy
/// untouched. `next_version` is invoked at most once, only when the
/// transaction leaves an object behind.
pub fn apply_write(
    pool: &str,
    oid: &str,
    current: Option<&StoredObject>,
    op: &WriteOp,
    next_version: impl FnOnce() -> StoreResult<ConcurrencyToken>,
) -> StoreResult<(Option<StoredObject>, WriteResult)> {
    check_precondition(pool, oid, current, op.precondition())?;

    if op.is_empty() {
        return Ok((current.cloned(), WriteResult::Unchanged));
    }

    let mut slot = current.cloned();
    for step in op.steps() {
        match step {
            WriteStep::Remove => {
                if slot.take().is_none() {
                    return Err(StoreError::NotFound {
                        pool: pool.to_string(),
                        oid: oid.to_string(),
                    });
                }
            }
            WriteStep::SetXattr { name, value } => {
                object_mut(&mut slot)
                    .xattrs
                    .insert(name.clone(), value.clone());
            }
            WriteStep::WriteFull(body) => {
                object_mut(&mut slot).body = body.clone();
            }
            WriteStep::OmapSet(entries) => {
                let obj = object_mut(&mut slot);
                for (k, v) in entries {
                    obj.omap.insert(k.clone(), v.clone());
                }
            }
            WriteStep::OmapRemoveKeys(keys) => {
                let obj = object_mut(&mut slot);
                for k in keys {
                    obj.omap.remove(k);
                }
            }
        }
    }

    match slot {
        Some(mut obj) => {
            let version = next_version()?;
            obj.version = version;
            Ok((Some(obj), WriteResult::Written(version)))
        }
        None => Ok((None, WriteResult::Removed)),
    }
}

/// Writes to an absent object create it, as in most object stores.
fn object_mut(slot: &mut Option<StoredObject>) -> &mut StoredObject {
    slot.get_or_insert_with(|| StoredObject::empty(ConcurrencyToken::from_raw(0)))
}
