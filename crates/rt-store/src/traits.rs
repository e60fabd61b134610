use std::sync::Arc;

use rt_types::ConcurrencyToken;

use crate::error::{StoreError, StoreResult};
use crate::op::{ReadOp, ReadResult, WriteOp, WriteResult};

/// Transactional object store addressed by (pool, object id).
///
/// All implementations must satisfy these invariants:
/// - A write transaction is atomic: either every step is applied or none is,
///   and a failed precondition aborts the whole transaction.
/// - A read transaction observes a single object version.
/// - Every committed write that leaves the object in place assigns a new
///   version. Versions are never reused for the same object id, including
///   after the object has been deleted and created again.
/// - Operations on a pool that does not exist fail with `PoolNotFound`.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read one extended attribute.
    ///
    /// Fails with `NotFound` if the object is absent and with `NoAttribute`
    /// if the object exists without this attribute.
    fn get_xattr(&self, pool: &str, oid: &str, name: &str) -> StoreResult<Vec<u8>>;

    /// Execute an atomic read transaction.
    fn read(&self, pool: &str, oid: &str, op: &ReadOp) -> StoreResult<ReadResult>;

    /// Execute an atomic write transaction.
    fn write(&self, pool: &str, oid: &str, op: &WriteOp) -> StoreResult<WriteResult>;

    /// Current version of an object, or `None` if it does not exist.
    fn stat(&self, pool: &str, oid: &str) -> StoreResult<Option<ConcurrencyToken>>;

    /// Create a pool. Creating an existing pool is a no-op.
    fn create_pool(&self, pool: &str) -> StoreResult<()>;

    /// Check whether a pool exists.
    fn pool_exists(&self, pool: &str) -> StoreResult<bool>;

    /// List object ids in a pool, sorted.
    fn list_objects(&self, pool: &str) -> StoreResult<Vec<String>>;

    /// Check whether an object exists.
    fn exists(&self, pool: &str, oid: &str) -> StoreResult<bool> {
        Ok(self.stat(pool, oid)?.is_some())
    }

    /// Read an attribute, mapping "object absent" and "attribute absent"
    /// to `Ok(None)`.
    fn try_get_xattr(&self, pool: &str, oid: &str, name: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.get_xattr(pool, oid, name) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::NotFound { .. } | StoreError::NoAttribute { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

macro_rules! forward_object_store {
    ($($ty:ty),*) => {$(
        impl<T: ObjectStore + ?Sized> ObjectStore for $ty {
            fn get_xattr(&self, pool: &str, oid: &str, name: &str) -> StoreResult<Vec<u8>> {
                (**self).get_xattr(pool, oid, name)
            }

            fn read(&self, pool: &str, oid: &str, op: &ReadOp) -> StoreResult<ReadResult> {
                (**self).read(pool, oid, op)
            }

            fn write(&self, pool: &str, oid: &str, op: &WriteOp) -> StoreResult<WriteResult> {
                (**self).write(pool, oid, op)
            }

            fn stat(&self, pool: &str, oid: &str) -> StoreResult<Option<ConcurrencyToken>> {
                (**self).stat(pool, oid)
            }

            fn create_pool(&self, pool: &str) -> StoreResult<()> {
                (**self).create_pool(pool)
            }

            fn pool_exists(&self, pool: &str) -> StoreResult<bool> {
                (**self).pool_exists(pool)
            }

            fn list_objects(&self, pool: &str) -> StoreResult<Vec<String>> {
                (**self).list_objects(pool)
            }
        }
    )*};
}

forward_object_store!(&T, Arc<T>, Box<T>);
