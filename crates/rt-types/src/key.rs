use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque byte-string identifying one reference held by a tracker.
///
/// Keys are compared bytewise. The tracker never interprets them; callers
/// typically use volume IDs, snapshot handles, or request IDs.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefKey(Vec<u8>);

impl RefKey {
    /// Wrap raw bytes as a key.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Wrap raw bytes, rejecting the empty key.
    pub fn try_new(bytes: impl Into<Vec<u8>>) -> Result<Self, TypeError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(TypeError::EmptyKey);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex-encoded representation, safe for any byte content.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse from a hex string produced by [`RefKey::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for RefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "RefKey({s:?})"),
            Err(_) => write!(f, "RefKey(0x{})", self.to_hex()),
        }
    }
}

/// Displays UTF-8 keys verbatim and anything else as `0x`-prefixed hex.
impl fmt::Display for RefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => write!(f, "0x{}", self.to_hex()),
        }
    }
}

impl From<&str> for RefKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for RefKey {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&[u8]> for RefKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for RefKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for RefKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A deduplicated set of reference keys, iterated in byte order.
///
/// Tracker operations take a `KeySet` rather than a slice so that a caller
/// passing the same key twice can never be counted twice.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet(BTreeSet<RefKey>);

impl KeySet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse a comma-separated key list such as `"vol-1,vol-2"`.
    ///
    /// Empty tokens (`"a,,b"`, trailing commas) are rejected.
    pub fn parse_list(list: &str) -> Result<Self, TypeError> {
        list.split(',')
            .map(|token| RefKey::try_new(token.as_bytes()))
            .collect()
    }

    /// Insert a key. Returns `false` if it was already present.
    pub fn insert(&mut self, key: impl Into<RefKey>) -> bool {
        self.0.insert(key.into())
    }

    pub fn contains(&self, key: &RefKey) -> bool {
        self.0.contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, RefKey> {
        self.0.iter()
    }

    /// Split the set by a membership vector aligned with [`KeySet::iter`].
    ///
    /// Returns `(present, absent)`. Panics if `found.len() != self.len()`.
    pub fn partition(&self, found: &[bool]) -> (KeySet, KeySet) {
        assert_eq!(found.len(), self.len(), "membership vector length mismatch");
        let mut present = KeySet::new();
        let mut absent = KeySet::new();
        for (key, &hit) in self.iter().zip(found) {
            if hit {
                present.0.insert(key.clone());
            } else {
                absent.0.insert(key.clone());
            }
        }
        (present, absent)
    }

    /// Comma-joined display form, used in log lines.
    pub fn joined(&self) -> String {
        self.iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<K: Into<RefKey>> FromIterator<K> for KeySet {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<RefKey>> Extend<K> for KeySet {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

impl IntoIterator for KeySet {
    type Item = RefKey;
    type IntoIter = btree_set::IntoIter<RefKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a RefKey;
    type IntoIter = btree_set::Iter<'a, RefKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
