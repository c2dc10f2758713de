use bytes::Bytes;
use tessera_types::{ChunkId, Timestamp};

use crate::chunk::ChunkMeta;
use crate::error::StoreResult;

/// Lazy sequence of chunk ids produced by [`ChunkStore::ids`].
pub type ChunkIdIter<'a> = Box<dyn Iterator<Item = StoreResult<ChunkId>> + 'a>;

/// Content-addressed chunk store.
///
/// All implementations must satisfy these invariants:
/// - Chunks are immutable once written. The same bytes always produce the
///   same id, and at most one copy is kept.
/// - Two concurrent `put`s of the same bytes converge to one intact chunk.
/// - `put` of existing bytes, `set_marked` and `sweep_chunk` on one id are
///   atomic with respect to each other, so a sweep can never delete a chunk
///   whose timestamp a concurrent writer has just refreshed.
/// - All I/O errors are propagated, never silently ignored.
pub trait ChunkStore: Send + Sync {
    /// Store a block and return its content address.
    ///
    /// If the chunk already exists nothing new is stored (idempotent), but
    /// its last-modified time is raised to `now`.
    fn put(&self, data: &[u8], now: Timestamp) -> StoreResult<ChunkId>;

    /// Read a chunk's bytes.
    ///
    /// Returns `Ok(None)` if the chunk does not exist.
    fn get(&self, id: &ChunkId) -> StoreResult<Option<Bytes>>;

    /// Read a chunk's metadata, or `Ok(None)` if it does not exist.
    fn metadata(&self, id: &ChunkId) -> StoreResult<Option<ChunkMeta>>;

    /// Check whether a chunk exists in the store.
    fn exists(&self, id: &ChunkId) -> StoreResult<bool> {
        Ok(self.metadata(id)?.is_some())
    }

    /// Delete a chunk unconditionally. Returns `true` if the chunk existed.
    ///
    /// Deleting a chunk that a live blob still references breaks that blob.
    fn delete(&self, id: &ChunkId) -> StoreResult<bool>;

    /// Enumerate every stored chunk id.
    ///
    /// The sequence is lazy where the backend allows it; chunks written or
    /// deleted while it is consumed may or may not appear.
    fn ids(&self) -> StoreResult<ChunkIdIter<'_>>;

    /// Set or clear a chunk's mark flag. Returns `false` if the chunk does
    /// not exist.
    fn set_marked(&self, id: &ChunkId, marked: bool) -> StoreResult<bool>;

    /// Clear the mark flag of every chunk.
    ///
    /// Default implementation walks [`ChunkStore::ids`]. Backends may
    /// override it with a single pass.
    fn clear_marks(&self) -> StoreResult<()> {
        for id in self.ids()? {
            self.set_marked(&id?, false)?;
        }
        Ok(())
    }

    /// Delete a chunk if it is unmarked and was last modified strictly
    /// before `cutoff`, returning the number of bytes freed.
    ///
    /// Returns `Ok(None)` when the chunk is absent or not collectable.
    fn sweep_chunk(&self, id: &ChunkId, cutoff: Timestamp) -> StoreResult<Option<u64>>;
}
