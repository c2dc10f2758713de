use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use tessera_crypto::ContentHasher;
use tessera_types::{ChunkId, Timestamp};
use tracing::debug;

use crate::chunk::ChunkMeta;
use crate::error::{StoreError, StoreResult};
use crate::traits::{ChunkIdIter, ChunkStore};

/// One chunk held in memory.
#[derive(Clone, Debug)]
struct MemoryChunk {
    data: Bytes,
    last_modified: Timestamp,
    marked: bool,
}

impl MemoryChunk {
    fn meta(&self) -> ChunkMeta {
        ChunkMeta {
            size: self.data.len() as u64,
            last_modified: self.last_modified,
            marked: self.marked,
        }
    }
}

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests and embedding. All chunks are held in memory behind a
/// `RwLock`; every per-chunk metadata change happens under the write lock,
/// which is what makes refresh, mark and sweep atomic per chunk.
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<ChunkId, MemoryChunk>>,
}

impl InMemoryChunkStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of chunks currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read_map()?.len())
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read_map()?.is_empty())
    }

    /// Total bytes across all stored chunks.
    pub fn total_bytes(&self) -> StoreResult<u64> {
        Ok(self
            .read_map()?
            .values()
            .map(|chunk| chunk.data.len() as u64)
            .sum())
    }

    fn read_map(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<ChunkId, MemoryChunk>>> {
        self.chunks
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_map(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<ChunkId, MemoryChunk>>> {
        self.chunks
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn put(&self, data: &[u8], now: Timestamp) -> StoreResult<ChunkId> {
        let id = ContentHasher::CHUNK.hash(data);
        let mut map = self.write_map()?;
        match map.entry(id) {
            Entry::Occupied(mut existing) => {
                let chunk = existing.get_mut();
                chunk.last_modified = chunk.last_modified.max(now);
            }
            Entry::Vacant(slot) => {
                slot.insert(MemoryChunk {
                    data: Bytes::copy_from_slice(data),
                    last_modified: now,
                    marked: false,
                });
                debug!(chunk = %id.short_hex(), len = data.len(), "stored chunk");
            }
        }
        Ok(id)
    }

    fn get(&self, id: &ChunkId) -> StoreResult<Option<Bytes>> {
        Ok(self.read_map()?.get(id).map(|chunk| chunk.data.clone()))
    }

    fn metadata(&self, id: &ChunkId) -> StoreResult<Option<ChunkMeta>> {
        Ok(self.read_map()?.get(id).map(MemoryChunk::meta))
    }

    fn delete(&self, id: &ChunkId) -> StoreResult<bool> {
        Ok(self.write_map()?.remove(id).is_some())
    }

    fn ids(&self) -> StoreResult<ChunkIdIter<'_>> {
        let mut ids: Vec<ChunkId> = self.read_map()?.keys().copied().collect();
        ids.sort();
        Ok(Box::new(ids.into_iter().map(Ok)))
    }

    fn set_marked(&self, id: &ChunkId, marked: bool) -> StoreResult<bool> {
        match self.write_map()?.get_mut(id) {
            Some(chunk) => {
                chunk.marked = marked;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear_marks(&self) -> StoreResult<()> {
        for chunk in self.write_map()?.values_mut() {
            chunk.marked = false;
        }
        Ok(())
    }

    fn sweep_chunk(&self, id: &ChunkId, cutoff: Timestamp) -> StoreResult<Option<u64>> {
        let mut map = self.write_map()?;
        let collectable = map
            .get(id)
            .is_some_and(|chunk| chunk.meta().is_collectable(cutoff));
        if !collectable {
            return Ok(None);
        }
        Ok(map.remove(id).map(|chunk| chunk.data.len() as u64))
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("InMemoryChunkStore")
            .field("chunk_count", &count)
            .finish()
    }
}
