//! Fixed-size big-endian encodings of the schema version and V1 body.

use thiserror::Error;

/// Encoded size of the schema version attribute.
pub const VERSION_SIZE: usize = 4;

/// Encoded size of the V1 refcount field.
pub const REFCOUNT_SIZE: usize = 4;

/// Size of the complete V1 object body.
pub const V1_BODY_SIZE: usize = REFCOUNT_SIZE;

/// A buffer read back from the store was too short to decode.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{field} truncated: expected {expected} bytes, got {actual}")]
pub struct CodecError {
    pub field: &'static str,
    pub expected: usize,
    pub actual: usize,
}

pub fn encode_version(version: u32) -> [u8; VERSION_SIZE] {
    version.to_be_bytes()
}

/// Decode a schema version. Panics if `buf` is shorter than 4 bytes.
pub fn decode_version(buf: &[u8]) -> u32 {
    try_decode_version(buf).expect("version buffer shorter than 4 bytes")
}

pub fn try_decode_version(buf: &[u8]) -> Result<u32, CodecError> {
    read_u32("schema version", buf)
}

pub fn encode_refcount(refcount: u32) -> [u8; REFCOUNT_SIZE] {
    refcount.to_be_bytes()
}

/// Decode a refcount. Panics if `buf` is shorter than 4 bytes.
pub fn decode_refcount(buf: &[u8]) -> u32 {
    try_decode_refcount(buf).expect("refcount buffer shorter than 4 bytes")
}

pub fn try_decode_refcount(buf: &[u8]) -> Result<u32, CodecError> {
    read_u32("refcount", buf)
}

fn read_u32(field: &'static str, buf: &[u8]) -> Result<u32, CodecError> {
    let bytes: [u8; 4] = buf
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(CodecError {
            field,
            expected: 4,
            actual: buf.len(),
        })?;
    Ok(u32::from_be_bytes(bytes))
}
