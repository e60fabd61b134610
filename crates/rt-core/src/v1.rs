//! Version 1 tracker layout.
//!
//! ```text
//! attribute "schema-version"   u32 BE   always 1
//! body bytes 0..4              u32 BE   refcount
//! object map                   key -> empty value, one entry per reference
//! ```
//!
//! The object version assigned by the store is the concurrency token: every
//! mutation is a single write transaction conditioned on the version seen by
//! the preceding read.

use rt_store::{ObjectStore, ReadOp, StoreError, WriteOp};
use rt_types::{ConcurrencyToken, KeySet, RefKey, SchemaVersion, TrackerId};
use tracing::{debug, info};

use crate::codec::{self, V1_BODY_SIZE};
use crate::error::{Result, TrackerError};
use crate::layout::Layout;
use crate::resolver::VERSION_XATTR;
use crate::types::{AddOutcome, RemoveOutcome, Snapshot, TrackerState};

/// The version 1 layout: refcount in the body, keys in the object map.
#[derive(Clone, Copy, Debug, Default)]
pub struct V1Layout;

impl V1Layout {
    fn write(&self, store: &dyn ObjectStore, id: &TrackerId, op: &WriteOp) -> Result<()> {
        store
            .write(&id.pool, &id.name, op)
            .map(|_| ())
            .map_err(|e| write_error(id, e))
    }
}

/// Failed preconditions become `Conflict`; everything else passes through.
fn write_error(id: &TrackerId, err: StoreError) -> TrackerError {
    if err.is_precondition_failure() {
        info!(tracker = %id, error = %err, "tracker changed since it was read");
        TrackerError::Conflict { id: id.clone() }
    } else {
        TrackerError::Store(err)
    }
}

/// Classify a failed exclusive create. Another creator wins with the version
/// attribute in place; an object without it is not a tracker and retrying
/// can never succeed.
fn lost_create(store: &dyn ObjectStore, id: &TrackerId) -> TrackerError {
    match store.get_xattr(&id.pool, &id.name, VERSION_XATTR) {
        Ok(_) | Err(StoreError::NotFound { .. }) => {
            info!(tracker = %id, "tracker created concurrently");
            TrackerError::Conflict { id: id.clone() }
        }
        Err(StoreError::NoAttribute { .. }) => TrackerError::Corrupt {
            id: id.clone(),
            reason: format!("object exists without a {VERSION_XATTR} attribute"),
        },
        Err(e) => TrackerError::Store(e),
    }
}

fn omap_entries(keys: &KeySet) -> impl Iterator<Item = (Vec<u8>, Vec<u8>)> + '_ {
    keys.iter().map(|k| (k.as_bytes().to_vec(), Vec::new()))
}

fn omap_keys(keys: &KeySet) -> impl Iterator<Item = Vec<u8>> + '_ {
    keys.iter().map(|k| k.as_bytes().to_vec())
}

fn refcount_for(id: &TrackerId, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| TrackerError::RefcountOverflow { id: id.clone() })
}

impl Layout for V1Layout {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::V1
    }

    fn create(&self, store: &dyn ObjectStore, id: &TrackerId, keys: &KeySet) -> Result<AddOutcome> {
        let refcount = refcount_for(id, keys.len())?;
        info!(tracker = %id, refcount, "initializing new v1 tracker");

        let op = WriteOp::new()
            .create_exclusive()
            .set_xattr(VERSION_XATTR, codec::encode_version(SchemaVersion::V1.get()).to_vec())
            .write_full(codec::encode_refcount(refcount).to_vec())
            .omap_set(omap_entries(keys));
        match store.write(&id.pool, &id.name, &op) {
            Ok(_) => {}
            Err(StoreError::AlreadyExists { .. }) => return Err(lost_create(store, id)),
            Err(e) => return Err(write_error(id, e)),
        }

        Ok(AddOutcome {
            created: true,
            added: keys.len(),
        })
    }

    fn read(
        &self,
        store: &dyn ObjectStore,
        id: &TrackerId,
        expected: Option<ConcurrencyToken>,
        candidates: &KeySet,
    ) -> Result<Snapshot> {
        let mut op = ReadOp::new()
            .read_body(V1_BODY_SIZE)
            .omap_get_by_keys(omap_keys(candidates));
        if let Some(token) = expected {
            op = op.assert_version(token);
        }

        let res = store.read(&id.pool, &id.name, &op).map_err(|e| match e {
            StoreError::NotFound { .. } => TrackerError::NotFound { id: id.clone() },
            StoreError::VersionMismatch { .. } => TrackerError::Conflict { id: id.clone() },
            other => TrackerError::Store(other),
        })?;

        let refcount =
            codec::try_decode_refcount(&res.body).map_err(|e| TrackerError::corrupt(id, e))?;
        let found: Vec<bool> = candidates
            .iter()
            .map(|key| res.omap.contains_key(key.as_bytes()))
            .collect();

        debug!(
            tracker = %id,
            refcount,
            token = %res.version,
            requested = candidates.len(),
            present = found.iter().filter(|f| **f).count(),
            "read v1 tracker"
        );
        Ok(Snapshot {
            refcount,
            token: res.version,
            found,
        })
    }

    fn add(&self, store: &dyn ObjectStore, id: &TrackerId, keys: &KeySet) -> Result<AddOutcome> {
        let snapshot = match self.read(store, id, None, keys) {
            Ok(s) => s,
            // Deleted after the version was resolved: the caller's retry
            // will take the create path.
            Err(TrackerError::NotFound { .. }) => {
                return Err(TrackerError::Conflict { id: id.clone() })
            }
            Err(e) => return Err(e),
        };

        let (_, to_add) = keys.partition(&snapshot.found);
        if to_add.is_empty() {
            info!(tracker = %id, "all keys already tracked; nothing to add");
            return Ok(AddOutcome {
                created: false,
                added: 0,
            });
        }

        let refcount = refcount_for(id, to_add.len())?
            .checked_add(snapshot.refcount)
            .ok_or_else(|| TrackerError::RefcountOverflow { id: id.clone() })?;
        info!(
            tracker = %id,
            adding = to_add.len(),
            requested = keys.len(),
            keys = %to_add.joined(),
            refcount,
            "adding keys"
        );

        let op = WriteOp::new()
            .assert_version(snapshot.token)
            .write_full(codec::encode_refcount(refcount).to_vec())
            .omap_set(omap_entries(&to_add));
        self.write(store, id, &op)?;

        Ok(AddOutcome {
            created: false,
            added: to_add.len(),
        })
    }

    fn remove(
        &self,
        store: &dyn ObjectStore,
        id: &TrackerId,
        keys: &KeySet,
    ) -> Result<RemoveOutcome> {
        let snapshot = match self.read(store, id, None, keys) {
            Ok(s) => s,
            Err(TrackerError::NotFound { .. }) => {
                info!(tracker = %id, "tracker vanished; treating as already deleted");
                return Ok(RemoveOutcome {
                    deleted: true,
                    removed: 0,
                });
            }
            Err(e) => return Err(e),
        };

        let (to_remove, _) = keys.partition(&snapshot.found);
        if to_remove.is_empty() {
            info!(tracker = %id, "none of the keys are tracked; nothing to remove");
            return Ok(RemoveOutcome {
                deleted: false,
                removed: 0,
            });
        }

        let removing = refcount_for(id, to_remove.len())?;
        let refcount = snapshot
            .refcount
            .checked_sub(removing)
            .ok_or_else(|| TrackerError::Corrupt {
                id: id.clone(),
                reason: format!(
                    "refcount {} is lower than the {} tracked keys being removed",
                    snapshot.refcount, removing
                ),
            })?;

        let op = WriteOp::new().assert_version(snapshot.token);
        let deleted = refcount == 0;
        let op = if deleted {
            info!(
                tracker = %id,
                keys = %to_remove.joined(),
                "last references removed; deleting tracker"
            );
            op.remove()
        } else {
            info!(
                tracker = %id,
                removing = to_remove.len(),
                requested = keys.len(),
                keys = %to_remove.joined(),
                refcount,
                "removing keys"
            );
            op.write_full(codec::encode_refcount(refcount).to_vec())
                .omap_remove_keys(omap_keys(&to_remove))
        };
        self.write(store, id, &op)?;

        Ok(RemoveOutcome {
            deleted,
            removed: to_remove.len(),
        })
    }

    fn inspect(&self, store: &dyn ObjectStore, id: &TrackerId) -> Result<Option<TrackerState>> {
        let op = ReadOp::new()
            .get_xattr(VERSION_XATTR)
            .read_body(V1_BODY_SIZE)
            .omap_get_all();
        let res = match store.read(&id.pool, &id.name, &op) {
            Ok(res) => res,
            Err(StoreError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(raw_version) = res.xattrs.get(VERSION_XATTR) else {
            return Ok(None);
        };
        let version = codec::try_decode_version(raw_version)
            .map_err(|e| TrackerError::corrupt(id, e))?;
        if version != SchemaVersion::V1.get() {
            return Err(TrackerError::UnsupportedVersion {
                id: id.clone(),
                version: SchemaVersion::new(version),
            });
        }
        let refcount =
            codec::try_decode_refcount(&res.body).map_err(|e| TrackerError::corrupt(id, e))?;

        Ok(Some(TrackerState {
            schema_version: SchemaVersion::V1,
            refcount,
            token: res.version,
            keys: res.omap.into_keys().map(RefKey::new).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_store::{InMemoryObjectStore, WriteResult};

    const POOL: &str = "rbd";

    fn id() -> TrackerId {
        TrackerId::new(POOL, "rt").unwrap()
    }

    fn keys(list: &[&str]) -> KeySet {
        list.iter().copied().collect()
    }

    fn created(store: &InMemoryObjectStore, list: &[&str]) {
        V1Layout.create(store, &id(), &keys(list)).unwrap();
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    #[test]
    fn create_writes_version_body_and_keys() {
        let store = InMemoryObjectStore::with_pool(POOL);
        let outcome = V1Layout.create(&store, &id(), &keys(&["a", "b"])).unwrap();
        assert_eq!(
            outcome,
            AddOutcome {
                created: true,
                added: 2,
            }
        );

        let obj = store.object(POOL, "rt").unwrap();
        assert_eq!(obj.xattrs[VERSION_XATTR], vec![0, 0, 0, 1]);
        assert_eq!(obj.body, vec![0, 0, 0, 2]);
        assert_eq!(obj.omap.len(), 2);
        assert!(obj.omap.values().all(Vec::is_empty));
    }

    #[test]
    fn second_create_conflicts() {
        let store = InMemoryObjectStore::with_pool(POOL);
        created(&store, &["a"]);
        let err = V1Layout.create(&store, &id(), &keys(&["b"])).unwrap_err();
        assert!(matches!(err, TrackerError::Conflict { .. }));
        assert_eq!(store.object(POOL, "rt").unwrap().omap.len(), 1);
    }

    #[test]
    fn create_over_foreign_object_is_corrupt() {
        let store = InMemoryObjectStore::with_pool(POOL);
        store
            .write(POOL, "rt", &WriteOp::new().write_full(vec![0, 0, 0, 7]))
            .unwrap();
        let err = V1Layout.create(&store, &id(), &keys(&["a"])).unwrap_err();
        assert!(matches!(err, TrackerError::Corrupt { .. }));
        assert!(!err.is_retryable());
        assert_eq!(store.object(POOL, "rt").unwrap().body, vec![0, 0, 0, 7]);
    }

    // -----------------------------------------------------------------------
    // Read
    // -----------------------------------------------------------------------

    #[test]
    fn read_reports_membership_in_candidate_order() {
        let store = InMemoryObjectStore::with_pool(POOL);
        created(&store, &["a", "c"]);
        let snap = V1Layout
            .read(&store, &id(), None, &keys(&["c", "b", "a"]))
            .unwrap();
        assert_eq!(snap.refcount, 2);
        // candidates iterate as a, b, c
        assert_eq!(snap.found, vec![true, false, true]);
        assert_eq!(Some(snap.token), store.stat(POOL, "rt").unwrap());
    }

    #[test]
    fn read_with_expected_token() {
        let store = InMemoryObjectStore::with_pool(POOL);
        created(&store, &["a"]);
        let token = store.stat(POOL, "rt").unwrap().unwrap();
        assert!(V1Layout.read(&store, &id(), Some(token), &keys(&["a"])).is_ok());

        V1Layout.add(&store, &id(), &keys(&["b"])).unwrap();
        let err = V1Layout
            .read(&store, &id(), Some(token), &keys(&["a"]))
            .unwrap_err();
        assert!(matches!(err, TrackerError::Conflict { .. }));
    }

    #[test]
    fn read_missing_is_not_found() {
        let store = InMemoryObjectStore::with_pool(POOL);
        let err = V1Layout.read(&store, &id(), None, &keys(&["a"])).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound { .. }));
    }

    #[test]
    fn short_body_is_corrupt() {
        let store = InMemoryObjectStore::with_pool(POOL);
        store
            .write(
                POOL,
                "rt",
                &WriteOp::new()
                    .set_xattr(VERSION_XATTR, vec![0, 0, 0, 1])
                    .write_full(vec![0, 1]),
            )
            .unwrap();
        let err = V1Layout.read(&store, &id(), None, &keys(&["a"])).unwrap_err();
        assert!(matches!(err, TrackerError::Corrupt { .. }));
    }

    // -----------------------------------------------------------------------
    // Add / remove
    // -----------------------------------------------------------------------

    #[test]
    fn add_writes_only_missing_keys() {
        let store = InMemoryObjectStore::with_pool(POOL);
        created(&store, &["a", "b"]);
        let outcome = V1Layout.add(&store, &id(), &keys(&["b", "c"])).unwrap();
        assert_eq!(
            outcome,
            AddOutcome {
                created: false,
                added: 1,
            }
        );
        let state = V1Layout.inspect(&store, &id()).unwrap().unwrap();
        assert_eq!(state.refcount, 3);
        assert_eq!(state.keys, keys(&["a", "b", "c"]));
    }

    #[test]
    fn add_on_vanished_tracker_conflicts() {
        let store = InMemoryObjectStore::with_pool(POOL);
        let err = V1Layout.add(&store, &id(), &keys(&["a"])).unwrap_err();
        assert!(matches!(err, TrackerError::Conflict { .. }));
    }

    #[test]
    fn add_refuses_to_overflow_refcount() {
        let store = InMemoryObjectStore::with_pool(POOL);
        store
            .write(
                POOL,
                "rt",
                &WriteOp::new()
                    .set_xattr(VERSION_XATTR, vec![0, 0, 0, 1])
                    .write_full(codec::encode_refcount(u32::MAX).to_vec()),
            )
            .unwrap();
        let err = V1Layout.add(&store, &id(), &keys(&["a"])).unwrap_err();
        assert!(matches!(err, TrackerError::RefcountOverflow { .. }));
    }

    #[test]
    fn remove_to_zero_deletes_object() {
        let store = InMemoryObjectStore::with_pool(POOL);
        created(&store, &["a", "b"]);
        let outcome = V1Layout.remove(&store, &id(), &keys(&["a", "b", "z"])).unwrap();
        assert_eq!(
            outcome,
            RemoveOutcome {
                deleted: true,
                removed: 2,
            }
        );
        assert!(store.object(POOL, "rt").is_none());
    }

    #[test]
    fn remove_with_inconsistent_refcount_is_corrupt() {
        let store = InMemoryObjectStore::with_pool(POOL);
        let op = WriteOp::new()
            .set_xattr(VERSION_XATTR, vec![0, 0, 0, 1])
            .write_full(vec![0, 0, 0, 1])
            .omap_set([(b"a".to_vec(), Vec::<u8>::new()), (b"b".to_vec(), Vec::new())]);
        assert!(matches!(store.write(POOL, "rt", &op).unwrap(), WriteResult::Written(_)));

        let err = V1Layout.remove(&store, &id(), &keys(&["a", "b"])).unwrap_err();
        assert!(matches!(err, TrackerError::Corrupt { .. }));
        // nothing was written
        assert_eq!(store.object(POOL, "rt").unwrap().omap.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Inspect
    // -----------------------------------------------------------------------

    #[test]
    fn inspect_absent_is_none() {
        let store = InMemoryObjectStore::with_pool(POOL);
        assert!(V1Layout.inspect(&store, &id()).unwrap().is_none());
    }

    #[test]
    fn inspect_reports_binary_keys() {
        let store = InMemoryObjectStore::with_pool(POOL);
        let mut set = KeySet::new();
        set.insert(RefKey::new(vec![0xde, 0xad]));
        V1Layout.create(&store, &id(), &set).unwrap();
        let state = V1Layout.inspect(&store, &id()).unwrap().unwrap();
        assert!(state.is_consistent());
        assert_eq!(state.keys, set);
    }
}
