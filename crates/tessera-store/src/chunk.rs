use serde::{Deserialize, Serialize};
use tessera_types::Timestamp;

/// Store-side metadata of one chunk.
///
/// None of this is part of a blob identifier; it exists only so garbage
/// collection can decide what to keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Number of bytes stored.
    pub size: u64,
    /// Time of the last write of these bytes (first write or dedup refresh).
    pub last_modified: Timestamp,
    /// Whether the current marking epoch has reached this chunk.
    pub marked: bool,
}

impl ChunkMeta {
    /// Whether a sweep with the given cutoff may delete this chunk.
    ///
    /// A chunk is collectable only when it is unmarked and was last written
    /// strictly before `cutoff`.
    pub fn is_collectable(&self, cutoff: Timestamp) -> bool {
        !self.marked && self.last_modified < cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(last_modified: u64, marked: bool) -> ChunkMeta {
        ChunkMeta {
            size: 10,
            last_modified: Timestamp::from_millis(last_modified),
            marked,
        }
    }

    #[test]
    fn unmarked_old_chunk_is_collectable() {
        assert!(meta(100, false).is_collectable(Timestamp::from_millis(101)));
    }

    #[test]
    fn cutoff_is_exclusive() {
        assert!(!meta(100, false).is_collectable(Timestamp::from_millis(100)));
    }

    #[test]
    fn marked_chunk_is_never_collectable() {
        assert!(!meta(0, true).is_collectable(Timestamp::from_millis(u64::MAX)));
    }

    #[test]
    fn serde_roundtrip() {
        let m = meta(5, true);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(serde_json::from_str::<ChunkMeta>(&json).unwrap(), m);
    }
}
