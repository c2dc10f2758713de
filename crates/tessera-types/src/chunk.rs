use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length in bytes of a chunk content hash.
pub const CHUNK_ID_LEN: usize = 32;

/// Content address of one physical chunk.
///
/// A `ChunkId` is the hash of a chunk's bytes. Identical bytes always
/// produce the same `ChunkId`, which is what lets the store keep a single
/// copy of every distinct block no matter how many blobs reference it.
///
/// The textual form is 64 lowercase hex characters; this is the form
/// returned by chunk listings and accepted by `delete_chunk`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId([u8; CHUNK_ID_LEN]);

impl ChunkId {
    /// Create a `ChunkId` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; CHUNK_ID_LEN]) -> Self {
        Self(hash)
    }

    /// Create a `ChunkId` from a hash slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; CHUNK_ID_LEN] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: CHUNK_ID_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; CHUNK_ID_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// The two directory levels a filesystem backend fans this id out into.
    pub fn fan_out(&self) -> (String, String) {
        (hex::encode(&self.0[..1]), hex::encode(&self.0[1..2]))
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.short_hex())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ChunkId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; CHUNK_ID_LEN]> for ChunkId {
    fn from(bytes: [u8; CHUNK_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ChunkId> for [u8; CHUNK_ID_LEN] {
    fn from(id: ChunkId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let id = ChunkId::from_hash([0x5a; 32]);
        let parsed = ChunkId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_str_accepts_uppercase() {
        let id = ChunkId::from_hash([0xab; 32]);
        let parsed: ChunkId = id.to_hex().to_uppercase().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = ChunkId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn rejects_non_hex() {
        let err = ChunkId::from_hex(&"zz".repeat(32)).unwrap_err();
        assert!(matches!(err, TypeError::InvalidHex(_)));
    }

    #[test]
    fn short_hex_is_8_chars() {
        let id = ChunkId::from_hash([1; 32]);
        assert_eq!(id.short_hex().len(), 8);
        assert_eq!(format!("{id:?}"), "ChunkId(01010101)");
    }

    #[test]
    fn display_is_full_hex() {
        let id = ChunkId::from_hash([0xff; 32]);
        let display = format!("{id}");
        assert_eq!(display.len(), 64);
        assert_eq!(display, id.to_hex());
    }

    #[test]
    fn fan_out_uses_leading_bytes() {
        let mut hash = [0u8; 32];
        hash[0] = 0xab;
        hash[1] = 0x0c;
        let (l1, l2) = ChunkId::from_hash(hash).fan_out();
        assert_eq!(l1, "ab");
        assert_eq!(l2, "0c");
    }

    #[test]
    fn serde_roundtrip() {
        let id = ChunkId::from_hash([9; 32]);
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ChunkId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ordering_is_consistent() {
        let id1 = ChunkId::from_hash([0; 32]);
        let id2 = ChunkId::from_hash([1; 32]);
        assert!(id1 < id2);
    }
}
