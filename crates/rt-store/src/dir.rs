//! Directory-backed object store for single-host, multi-process use.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<pool>/objects/<oid>.json   one JSON document per object
//! <root>/<pool>/locks/<oid>.lock     locked while a write transaction runs
//! <root>/<pool>/generation           last version handed out in this pool
//! <root>/<pool>/generation.lock      locked while bumping the generation
//! ```
//!
//! Writers serialize per object through exclusive advisory locks on the
//! lock files. The OS drops a lock when its holder exits, so a writer that
//! dies mid-transaction leaves at most an unlocked file behind. Readers
//! never lock because objects are replaced by an atomic rename followed by
//! a directory sync. Lock order is always object lock, then generation lock.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use fs4::FileExt;
use rt_types::{validate_component, ConcurrencyToken};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::object::{apply_write, StoredObject};
use crate::op::{ReadOp, ReadResult, WriteOp, WriteResult};
use crate::traits::ObjectStore;

const OBJECTS_DIR: &str = "objects";
const LOCKS_DIR: &str = "locks";
const GENERATION_FILE: &str = "generation";
const GENERATION_LOCK: &str = "generation.lock";

/// Lock acquisition policy for [`DirObjectStore`].
#[derive(Clone, Debug)]
pub struct LockConfig {
    /// How many times to try taking a lock before giving up.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            attempts: 200,
            delay: Duration::from_millis(5),
        }
    }
}

/// On-disk form of a [`StoredObject`]. Binary fields are hex-encoded.
#[derive(Debug, Serialize, Deserialize)]
struct ObjectFile {
    version: u64,
    body: String,
    #[serde(default)]
    xattrs: BTreeMap<String, String>,
    #[serde(default)]
    omap: BTreeMap<String, String>,
}

impl ObjectFile {
    fn from_object(obj: &StoredObject) -> Self {
        Self {
            version: obj.version.raw(),
            body: hex::encode(&obj.body),
            xattrs: obj
                .xattrs
                .iter()
                .map(|(k, v)| (k.clone(), hex::encode(v)))
                .collect(),
            omap: obj
                .omap
                .iter()
                .map(|(k, v)| (hex::encode(k), hex::encode(v)))
                .collect(),
        }
    }

    fn into_object(self) -> Result<StoredObject, hex::FromHexError> {
        let xattrs = self
            .xattrs
            .into_iter()
            .map(|(k, v)| Ok((k, hex::decode(v)?)))
            .collect::<Result<_, hex::FromHexError>>()?;
        let omap = self
            .omap
            .into_iter()
            .map(|(k, v)| Ok((hex::decode(k)?, hex::decode(v)?)))
            .collect::<Result<_, hex::FromHexError>>()?;
        Ok(StoredObject {
            version: ConcurrencyToken::from_raw(self.version),
            body: hex::decode(self.body)?,
            xattrs,
            omap,
        })
    }
}

/// Holds an exclusive advisory lock until dropped.
struct LockGuard {
    _file: File,
}

/// Flush directory entries so a rename or unlink survives a crash.
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Object store keeping each pool in a directory and each object in a file.
#[derive(Debug)]
pub struct DirObjectStore {
    root: PathBuf,
    lock: LockConfig,
}

impl DirObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::with_lock_config(root, LockConfig::default())
    }

    /// Open a store with an explicit lock policy.
    pub fn with_lock_config(root: impl Into<PathBuf>, lock: LockConfig) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, lock })
    }

    fn pool_dir(&self, pool: &str) -> StoreResult<PathBuf> {
        validate_component("pool", pool)?;
        let dir = self.root.join(pool);
        if !dir.is_dir() {
            return Err(StoreError::PoolNotFound(pool.to_string()));
        }
        Ok(dir)
    }

    fn object_path(pool_dir: &Path, oid: &str) -> PathBuf {
        pool_dir.join(OBJECTS_DIR).join(format!("{oid}.json"))
    }

    fn load(&self, pool: &str, oid: &str, pool_dir: &Path) -> StoreResult<Option<StoredObject>> {
        let path = Self::object_path(pool_dir, oid);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let corrupt = |reason: String| StoreError::Corrupt {
            pool: pool.to_string(),
            oid: oid.to_string(),
            reason,
        };
        let file: ObjectFile =
            serde_json::from_slice(&data).map_err(|e| corrupt(e.to_string()))?;
        file.into_object().map(Some).map_err(|e| corrupt(e.to_string()))
    }

    fn load_existing(&self, pool: &str, oid: &str) -> StoreResult<StoredObject> {
        validate_component("object", oid)?;
        let pool_dir = self.pool_dir(pool)?;
        self.load(pool, oid, &pool_dir)?
            .ok_or_else(|| StoreError::NotFound {
                pool: pool.to_string(),
                oid: oid.to_string(),
            })
    }

    fn persist(&self, pool_dir: &Path, oid: &str, obj: &StoredObject) -> StoreResult<()> {
        let objects_dir = pool_dir.join(OBJECTS_DIR);
        let json = serde_json::to_vec(&ObjectFile::from_object(obj))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&objects_dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(Self::object_path(pool_dir, oid))
            .map_err(|e| StoreError::Io(e.error))?;
        sync_dir(&objects_dir)?;
        Ok(())
    }

    fn acquire(&self, path: PathBuf, pool: &str, oid: &str) -> StoreResult<LockGuard> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        for attempt in 0..self.lock.attempts.max(1) {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(LockGuard { _file: file }),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if attempt + 1 < self.lock.attempts {
                        thread::sleep(self.lock.delay);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!(pool, oid, path = %path.display(), "lock not acquired");
        Err(StoreError::Busy {
            pool: pool.to_string(),
            oid: oid.to_string(),
        })
    }

    /// Hand out the next version for `pool`. Caller holds an object lock.
    fn next_version(&self, pool: &str, pool_dir: &Path) -> StoreResult<ConcurrencyToken> {
        let _guard = self.acquire(pool_dir.join(GENERATION_LOCK), pool, GENERATION_FILE)?;
        let path = pool_dir.join(GENERATION_FILE);
        let last = match fs::read_to_string(&path) {
            Ok(s) => s.trim().parse::<u64>().map_err(|e| StoreError::Corrupt {
                pool: pool.to_string(),
                oid: GENERATION_FILE.to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let next = last + 1;
        let mut tmp = tempfile::NamedTempFile::new_in(pool_dir)?;
        write!(tmp, "{next}")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        sync_dir(pool_dir)?;
        Ok(ConcurrencyToken::from_raw(next))
    }
}

impl ObjectStore for DirObjectStore {
    fn get_xattr(&self, pool: &str, oid: &str, name: &str) -> StoreResult<Vec<u8>> {
        let obj = self.load_existing(pool, oid)?;
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
        self.load_existing(pool, oid)?.read(pool, oid, op)
    }

    fn write(&self, pool: &str, oid: &str, op: &WriteOp) -> StoreResult<WriteResult> {
        validate_component("object", oid)?;
        let pool_dir = self.pool_dir(pool)?;
        let _guard = self.acquire(
            pool_dir.join(LOCKS_DIR).join(format!("{oid}.lock")),
            pool,
            oid,
        )?;

        let current = self.load(pool, oid, &pool_dir)?;
        let (slot, result) = apply_write(pool, oid, current.as_ref(), op, || {
            self.next_version(pool, &pool_dir)
        })?;

        match (&slot, result) {
            (_, WriteResult::Unchanged) => {}
            (Some(obj), _) => self.persist(&pool_dir, oid, obj)?,
            (None, _) => {
                fs::remove_file(Self::object_path(&pool_dir, oid))?;
                sync_dir(&pool_dir.join(OBJECTS_DIR))?;
            }
        }
        debug!(pool, oid, ?result, "directory write committed");
        Ok(result)
    }

    fn stat(&self, pool: &str, oid: &str) -> StoreResult<Option<ConcurrencyToken>> {
        validate_component("object", oid)?;
        let pool_dir = self.pool_dir(pool)?;
        Ok(self.load(pool, oid, &pool_dir)?.map(|obj| obj.version))
    }

    fn create_pool(&self, pool: &str) -> StoreResult<()> {
        validate_component("pool", pool)?;
        let dir = self.root.join(pool);
        fs::create_dir_all(dir.join(OBJECTS_DIR))?;
        fs::create_dir_all(dir.join(LOCKS_DIR))?;
        Ok(())
    }

    fn pool_exists(&self, pool: &str) -> StoreResult<bool> {
        validate_component("pool", pool)?;
        Ok(self.root.join(pool).is_dir())
    }

    fn list_objects(&self, pool: &str) -> StoreResult<Vec<String>> {
        let pool_dir = self.pool_dir(pool)?;
        let mut ids = Vec::new();
        for entry in fs::read_dir(pool_dir.join(OBJECTS_DIR))? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(oid) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                ids.push(oid.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const POOL: &str = "rbd";

    fn temp_store() -> (tempfile::TempDir, DirObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirObjectStore::open(dir.path()).unwrap();
        store.create_pool(POOL).unwrap();
        (dir, store)
    }

    fn written(result: WriteResult) -> ConcurrencyToken {
        match result {
            WriteResult::Written(token) => token,
            other => panic!("unexpected write result: {other:?}"),
        }
    }

    #[test]
    fn create_and_read_back() {
        let (_dir, store) = temp_store();
        let op = WriteOp::new()
            .create_exclusive()
            .set_xattr("schema-version", vec![0, 0, 0, 1])
            .write_full(vec![0, 0, 0, 2])
            .omap_set([(b"a".to_vec(), Vec::<u8>::new()), (vec![0xff, 0x00], Vec::new())]);
        let token = written(store.write(POOL, "rt", &op).unwrap());

        let res = store
            .read(POOL, "rt", &ReadOp::new().read_body(4).omap_get_all())
            .unwrap();
        assert_eq!(res.version, token);
        assert_eq!(res.body, vec![0, 0, 0, 2]);
        assert!(res.omap.contains_key(&[0xffu8, 0x00][..]));
        assert_eq!(store.get_xattr(POOL, "rt", "schema-version").unwrap(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn unknown_pool_is_an_error() {
        let (_dir, store) = temp_store();
        assert!(matches!(store.stat("other", "x"), Err(StoreError::PoolNotFound(_))));
        assert!(!store.pool_exists("other").unwrap());
    }

    #[test]
    fn missing_object_and_attribute() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.get_xattr(POOL, "nope", "v"),
            Err(StoreError::NotFound { .. })
        ));
        store.write(POOL, "rt", &WriteOp::new().write_full(vec![1])).unwrap();
        assert!(matches!(
            store.get_xattr(POOL, "rt", "v"),
            Err(StoreError::NoAttribute { .. })
        ));
    }

    #[test]
    fn stale_version_is_rejected_and_state_kept() {
        let (_dir, store) = temp_store();
        let first = written(store.write(POOL, "rt", &WriteOp::new().write_full(vec![1])).unwrap());
        written(
            store
                .write(POOL, "rt", &WriteOp::new().assert_version(first).write_full(vec![2]))
                .unwrap(),
        );
        let err = store
            .write(POOL, "rt", &WriteOp::new().assert_version(first).write_full(vec![3]))
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch { .. }));
        let res = store.read(POOL, "rt", &ReadOp::new().read_body(8)).unwrap();
        assert_eq!(res.body, vec![2]);
    }

    #[test]
    fn remove_deletes_file_and_versions_survive_recreate() {
        let (_dir, store) = temp_store();
        let first = written(store.write(POOL, "rt", &WriteOp::new().write_full(vec![1])).unwrap());
        assert_eq!(
            store.write(POOL, "rt", &WriteOp::new().assert_version(first).remove()).unwrap(),
            WriteResult::Removed
        );
        assert_eq!(store.stat(POOL, "rt").unwrap(), None);
        assert!(store.list_objects(POOL).unwrap().is_empty());

        let again = written(
            store
                .write(POOL, "rt", &WriteOp::new().create_exclusive().write_full(vec![1]))
                .unwrap(),
        );
        assert_ne!(first, again);
    }

    fn quick_lock_store() -> (tempfile::TempDir, DirObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirObjectStore::with_lock_config(
            dir.path(),
            LockConfig {
                attempts: 2,
                delay: Duration::from_millis(1),
            },
        )
        .unwrap();
        store.create_pool(POOL).unwrap();
        (dir, store)
    }

    fn hold_lock(path: &Path) -> File {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .unwrap();
        file.lock_exclusive().unwrap();
        file
    }

    #[test]
    fn held_lock_reports_busy_until_released() {
        let (dir, store) = quick_lock_store();
        let held = hold_lock(&dir.path().join(POOL).join(LOCKS_DIR).join("rt.lock"));

        let err = store.write(POOL, "rt", &WriteOp::new().write_full(vec![1])).unwrap_err();
        assert!(matches!(err, StoreError::Busy { .. }));
        // reads do not take locks
        assert_eq!(store.stat(POOL, "rt").unwrap(), None);

        drop(held);
        written(store.write(POOL, "rt", &WriteOp::new().write_full(vec![1])).unwrap());
    }

    #[test]
    fn lock_files_left_by_dead_writers_do_not_block() {
        let (dir, store) = quick_lock_store();
        let pool_dir = dir.path().join(POOL);
        // files exist but nobody holds a lock on them
        fs::write(pool_dir.join(LOCKS_DIR).join("rt.lock"), b"").unwrap();
        fs::write(pool_dir.join(GENERATION_LOCK), b"").unwrap();

        for i in 0..5u8 {
            written(store.write(POOL, "rt", &WriteOp::new().write_full(vec![i])).unwrap());
        }
        written(store.write(POOL, "other", &WriteOp::new().write_full(vec![1])).unwrap());
    }

    #[test]
    fn held_generation_lock_blocks_only_while_held() {
        let (dir, store) = quick_lock_store();
        let held = hold_lock(&dir.path().join(POOL).join(GENERATION_LOCK));
        assert!(matches!(
            store.write(POOL, "rt", &WriteOp::new().write_full(vec![1])),
            Err(StoreError::Busy { .. })
        ));
        drop(held);
        written(store.write(POOL, "rt", &WriteOp::new().write_full(vec![1])).unwrap());
    }

    #[test]
    fn lock_released_after_failed_transaction() {
        let (_dir, store) = quick_lock_store();
        let err = store
            .write(
                POOL,
                "rt",
                &WriteOp::new()
                    .assert_version(ConcurrencyToken::from_raw(1))
                    .write_full(vec![1]),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        written(store.write(POOL, "rt", &WriteOp::new().write_full(vec![1])).unwrap());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let (dir, store) = temp_store();
        fs::write(
            dir.path().join(POOL).join(OBJECTS_DIR).join("rt.json"),
            b"not json",
        )
        .unwrap();
        assert!(matches!(
            store.read(POOL, "rt", &ReadOp::new()),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn concurrent_cas_has_single_winner() {
        let (_dir, store) = temp_store();
        let token = written(store.write(POOL, "rt", &WriteOp::new().write_full(vec![0])).unwrap());
        let store = Arc::new(store);

        let handles: Vec<_> = (0..6u8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let op = WriteOp::new().assert_version(token).write_full(vec![i]);
                    store.write(POOL, "rt", &op).is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
