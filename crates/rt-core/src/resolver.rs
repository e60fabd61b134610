//! Schema version resolution.

use rt_store::ObjectStore;
use rt_types::{SchemaVersion, TrackerId};
use tracing::debug;

use crate::codec;
use crate::error::{Result, TrackerError};

/// Name of the attribute holding the big-endian schema version.
pub const VERSION_XATTR: &str = "schema-version";

/// Determine which layout an existing tracker uses.
///
/// Returns `Ok(None)` when the object, or its version attribute, does not
/// exist. Any other store failure, including a missing pool, is an error.
pub fn resolve_version(store: &dyn ObjectStore, id: &TrackerId) -> Result<Option<SchemaVersion>> {
    let Some(raw) = store.try_get_xattr(&id.pool, &id.name, VERSION_XATTR)? else {
        debug!(tracker = %id, "no schema version attribute");
        return Ok(None);
    };
    let version = codec::try_decode_version(&raw).map_err(|e| TrackerError::corrupt(id, e))?;
    let version = SchemaVersion::new(version);
    debug!(tracker = %id, %version, "resolved schema version");
    Ok(Some(version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_store::{InMemoryObjectStore, StoreError, WriteOp};

    fn id() -> TrackerId {
        TrackerId::new("rbd", "rt").unwrap()
    }

    #[test]
    fn absent_object_resolves_to_none() {
        let store = InMemoryObjectStore::with_pool("rbd");
        assert_eq!(resolve_version(&store, &id()).unwrap(), None);
    }

    #[test]
    fn object_without_attribute_resolves_to_none() {
        let store = InMemoryObjectStore::with_pool("rbd");
        store.write("rbd", "rt", &WriteOp::new().write_full(vec![1])).unwrap();
        assert_eq!(resolve_version(&store, &id()).unwrap(), None);
    }

    #[test]
    fn decodes_big_endian_attribute() {
        let store = InMemoryObjectStore::with_pool("rbd");
        store
            .write("rbd", "rt", &WriteOp::new().set_xattr(VERSION_XATTR, vec![0, 0, 0, 7]))
            .unwrap();
        assert_eq!(resolve_version(&store, &id()).unwrap(), Some(SchemaVersion::new(7)));
    }

    #[test]
    fn short_attribute_is_corrupt() {
        let store = InMemoryObjectStore::with_pool("rbd");
        store
            .write("rbd", "rt", &WriteOp::new().set_xattr(VERSION_XATTR, vec![1]))
            .unwrap();
        assert!(matches!(
            resolve_version(&store, &id()),
            Err(TrackerError::Corrupt { .. })
        ));
    }

    #[test]
    fn missing_pool_is_a_store_error() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            resolve_version(&store, &id()),
            Err(TrackerError::Store(StoreError::PoolNotFound(_)))
        ));
    }
}
