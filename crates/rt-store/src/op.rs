//! Transaction batches executed atomically by an [`ObjectStore`].
//!
//! A [`WriteOp`] is an optional [`Precondition`] followed by an ordered list
//! of [`WriteStep`]s. The store either applies every step or none of them.
//! A [`ReadOp`] combines an optional version assertion, a body read, attribute
//! reads and object-map lookups, all observed at the same object version.
//!
//! [`ObjectStore`]: crate::ObjectStore

use std::collections::BTreeMap;

use rt_types::ConcurrencyToken;

/// Condition checked before any step of a write transaction runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// The object must not exist (exclusive create).
    NotExists,
    /// The object must exist and be at exactly this version.
    VersionIs(ConcurrencyToken),
}

/// A single mutation inside a write transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteStep {
    /// Set an extended attribute.
    SetXattr { name: String, value: Vec<u8> },
    /// Replace the whole object body.
    WriteFull(Vec<u8>),
    /// Insert or overwrite object-map entries.
    OmapSet(Vec<(Vec<u8>, Vec<u8>)>),
    /// Remove object-map entries; absent keys are ignored.
    OmapRemoveKeys(Vec<Vec<u8>>),
    /// Delete the object together with its attributes and object map.
    Remove,
}

/// An atomic, optionally conditional, write transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOp {
    precondition: Option<Precondition>,
    steps: Vec<WriteStep>,
}

impl WriteOp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `AlreadyExists` if the object is present.
    pub fn create_exclusive(mut self) -> Self {
        self.precondition = Some(Precondition::NotExists);
        self
    }

    /// Fail with `VersionMismatch` unless the object is at `token`.
    pub fn assert_version(mut self, token: ConcurrencyToken) -> Self {
        self.precondition = Some(Precondition::VersionIs(token));
        self
    }

    pub fn set_xattr(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.steps.push(WriteStep::SetXattr {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn write_full(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.steps.push(WriteStep::WriteFull(body.into()));
        self
    }

    pub fn omap_set<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.steps.push(WriteStep::OmapSet(entries));
        self
    }

    pub fn omap_remove_keys<K: Into<Vec<u8>>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        let keys = keys.into_iter().map(Into::into).collect();
        self.steps.push(WriteStep::OmapRemoveKeys(keys));
        self
    }

    pub fn remove(mut self) -> Self {
        self.steps.push(WriteStep::Remove);
        self
    }

    pub fn precondition(&self) -> Option<Precondition> {
        self.precondition
    }

    pub fn steps(&self) -> &[WriteStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Which object-map entries a read transaction fetches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OmapRead {
    #[default]
    Nothing,
    /// Only these keys; missing keys are simply absent from the result.
    Keys(Vec<Vec<u8>>),
    /// Every entry.
    All,
}

/// An atomic read transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadOp {
    assert_version: Option<ConcurrencyToken>,
    body_len: Option<usize>,
    xattrs: Vec<String>,
    omap: OmapRead,
}

impl ReadOp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `VersionMismatch` unless the object is at `token`.
    pub fn assert_version(mut self, token: ConcurrencyToken) -> Self {
        self.assert_version = Some(token);
        self
    }

    /// Read up to `len` bytes from the start of the body.
    pub fn read_body(mut self, len: usize) -> Self {
        self.body_len = Some(len);
        self
    }

    pub fn get_xattr(mut self, name: impl Into<String>) -> Self {
        self.xattrs.push(name.into());
        self
    }

    pub fn omap_get_by_keys<K: Into<Vec<u8>>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.omap = OmapRead::Keys(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn omap_get_all(mut self) -> Self {
        self.omap = OmapRead::All;
        self
    }

    pub fn version_assertion(&self) -> Option<ConcurrencyToken> {
        self.assert_version
    }

    pub fn body_len(&self) -> Option<usize> {
        self.body_len
    }

    pub fn xattrs(&self) -> &[String] {
        &self.xattrs
    }

    pub fn omap(&self) -> &OmapRead {
        &self.omap
    }
}

/// Everything a [`ReadOp`] observed, at a single object version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadResult {
    /// Version of the object when the transaction ran.
    pub version: ConcurrencyToken,
    /// Body bytes (empty unless requested).
    pub body: Vec<u8>,
    /// Requested attributes that exist on the object.
    pub xattrs: BTreeMap<String, Vec<u8>>,
    /// Requested object-map entries that exist on the object.
    pub omap: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Outcome of a committed write transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteResult {
    /// The object exists at this new version.
    Written(ConcurrencyToken),
    /// The transaction deleted the object.
    Removed,
    /// The transaction had no steps; nothing changed.
    Unchanged,
}
