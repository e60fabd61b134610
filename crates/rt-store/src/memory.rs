use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use rt_types::{validate_component, ConcurrencyToken};
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::object::{apply_write, StoredObject};
use crate::op::{ReadOp, ReadResult, WriteOp, WriteResult};
use crate::traits::ObjectStore;

type Pool = HashMap<String, StoredObject>;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Pools and objects are held behind a
/// single `RwLock`; every write transaction runs entirely under the write
/// lock, which makes it atomic with respect to all other transactions.
/// Versions come from one store-wide counter, so a deleted and recreated
/// object never sees an old version again.
pub struct InMemoryObjectStore {
    pools: RwLock<HashMap<String, Pool>>,
    next_version: AtomicU64,
    commits: AtomicU64,
}

impl InMemoryObjectStore {
    /// Create a new store with no pools.
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            commits: AtomicU64::new(0),
        }
    }

    /// Create a new store holding one empty pool.
    pub fn with_pool(pool: &str) -> Self {
        let store = Self::new();
        store
            .pools
            .write()
            .expect("lock poisoned")
            .insert(pool.to_string(), HashMap::new());
        store
    }

    /// Number of objects in a pool (0 for unknown pools).
    pub fn len(&self, pool: &str) -> usize {
        self.pools
            .read()
            .expect("lock poisoned")
            .get(pool)
            .map_or(0, HashMap::len)
    }

    /// Returns `true` if no pool holds any object.
    pub fn is_empty(&self) -> bool {
        self.pools
            .read()
            .expect("lock poisoned")
            .values()
            .all(HashMap::is_empty)
    }

    /// Number of write transactions that changed state since creation.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Snapshot of an object, for assertions in tests.
    pub fn object(&self, pool: &str, oid: &str) -> Option<StoredObject> {
        self.pools
            .read()
            .expect("lock poisoned")
            .get(pool)
            .and_then(|p| p.get(oid))
            .cloned()
    }

    fn pool_not_found(pool: &str) -> StoreError {
        StoreError::PoolNotFound(pool.to_string())
    }

    fn object_not_found(pool: &str, oid: &str) -> StoreError {
        StoreError::NotFound {
            pool: pool.to_string(),
            oid: oid.to_string(),
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get_xattr(&self, pool: &str, oid: &str, name: &str) -> StoreResult<Vec<u8>> {
        let pools = self.pools.read().expect("lock poisoned");
        let objects = pools.get(pool).ok_or_else(|| Self::pool_not_found(pool))?;
        let obj = objects
            .get(oid)
            .ok_or_else(|| Self::object_not_found(pool, oid))?;
        obj.xattrs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NoAttribute {
                pool: pool.to_string(),
                oid: oid.to_string(),
                name: name.to_string(),
            })
    }

    fn read(&self, pool: &str, oid: &str, op: &ReadOp) -> StoreResult<ReadResult> {
        let pools = self.pools.read().expect("lock poisoned");
        let objects = pools.get(pool).ok_or_else(|| Self::pool_not_found(pool))?;
        let obj = objects
            .get(oid)
            .ok_or_else(|| Self::object_not_found(pool, oid))?;
        obj.read(pool, oid, op)
    }

    fn write(&self, pool: &str, oid: &str, op: &WriteOp) -> StoreResult<WriteResult> {
        validate_component("object", oid)?;
        let mut pools = self.pools.write().expect("lock poisoned");
        let objects = pools
            .get_mut(pool)
            .ok_or_else(|| Self::pool_not_found(pool))?;

        let (slot, result) = apply_write(pool, oid, objects.get(oid), op, || {
            Ok(ConcurrencyToken::from_raw(
                self.next_version.fetch_add(1, Ordering::SeqCst),
            ))
        })?;

        match slot {
            Some(obj) => {
                objects.insert(oid.to_string(), obj);
            }
            None => {
                objects.remove(oid);
            }
        }
        if result != WriteResult::Unchanged {
            self.commits.fetch_add(1, Ordering::SeqCst);
        }
        trace!(pool, oid, ?result, "in-memory write committed");
        Ok(result)
    }

    fn stat(&self, pool: &str, oid: &str) -> StoreResult<Option<ConcurrencyToken>> {
        let pools = self.pools.read().expect("lock poisoned");
        let objects = pools.get(pool).ok_or_else(|| Self::pool_not_found(pool))?;
        Ok(objects.get(oid).map(|obj| obj.version))
    }

    fn create_pool(&self, pool: &str) -> StoreResult<()> {
        validate_component("pool", pool)?;
        self.pools
            .write()
            .expect("lock poisoned")
            .entry(pool.to_string())
            .or_default();
        Ok(())
    }

    fn pool_exists(&self, pool: &str) -> StoreResult<bool> {
        Ok(self.pools.read().expect("lock poisoned").contains_key(pool))
    }

    fn list_objects(&self, pool: &str) -> StoreResult<Vec<String>> {
        let pools = self.pools.read().expect("lock poisoned");
        let objects = pools.get(pool).ok_or_else(|| Self::pool_not_found(pool))?;
        let mut ids: Vec<String> = objects.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pools = self.pools.read().expect("lock poisoned");
        let objects: usize = pools.values().map(HashMap::len).sum();
        f.debug_struct("InMemoryObjectStore")
            .field("pool_count", &pools.len())
            .field("object_count", &objects)
            .finish()
    }
}
