use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use tessera_types::ChunkId;

/// Hit/miss counters for a [`BlockCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub bytes: usize,
}

struct Inner {
    lru: LruCache<ChunkId, Bytes>,
    bytes: usize,
    /// Bumped by every invalidation, under the same lock as the entries.
    generation: u64,
}

/// Least-recently-used cache of chunk contents, bounded by total bytes.
///
/// A chunk larger than the whole budget is never cached. A budget of zero
/// disables caching.
///
/// Readers that load a chunk from the backend insert it with
/// [`insert_if_unchanged`](Self::insert_if_unchanged), passing the
/// [`generation`](Self::generation) read before the load. An invalidation in
/// between discards the insert, so a chunk deleted while it was being read
/// never reappears in the cache.
pub struct BlockCache {
    inner: Mutex<Inner>,
    capacity_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlockCache {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::unbounded(),
                bytes: 0,
                generation: 0,
            }),
            capacity_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn get(&self, id: &ChunkId) -> Option<Bytes> {
        let found = self.inner.lock().lru.get(id).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, id: ChunkId, data: Bytes) {
        if data.len() > self.capacity_bytes {
            return;
        }
        self.store(&mut self.inner.lock(), id, data);
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Insert only if nothing was invalidated since `generation` was read.
    /// Returns whether the entry was stored.
    pub fn insert_if_unchanged(&self, id: ChunkId, data: Bytes, generation: u64) -> bool {
        if data.len() > self.capacity_bytes {
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        self.store(&mut inner, id, data);
        true
    }

    fn store(&self, inner: &mut Inner, id: ChunkId, data: Bytes) {
        let added = data.len();
        if let Some(old) = inner.lru.put(id, data) {
            inner.bytes -= old.len();
        }
        inner.bytes += added;
        while inner.bytes > self.capacity_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => inner.bytes -= evicted.len(),
                None => break,
            }
        }
    }

    /// Drop one entry. Returns `true` if it was cached.
    pub fn invalidate(&self, id: &ChunkId) -> bool {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        match inner.lru.pop(id) {
            Some(old) => {
                inner.bytes -= old.len();
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.lru.clear();
        inner.bytes = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: inner.lru.len(),
            bytes: inner.bytes,
        }
    }
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("BlockCache")
            .field("capacity_bytes", &self.capacity_bytes)
            .field("entries", &stats.entries)
            .field("bytes", &stats.bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> ChunkId {
        ChunkId::from_hash([n; 32])
    }

    fn block(len: usize) -> Bytes {
        Bytes::from(vec![0u8; len])
    }

    #[test]
    fn hit_and_miss_are_counted() {
        let cache = BlockCache::new(100);
        cache.insert(id(1), block(10));
        assert!(cache.get(&id(1)).is_some());
        assert!(cache.get(&id(2)).is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!((stats.entries, stats.bytes), (1, 10));
    }

    #[test]
    fn evicts_least_recently_used_past_budget() {
        let cache = BlockCache::new(30);
        cache.insert(id(1), block(10));
        cache.insert(id(2), block(10));
        cache.insert(id(3), block(10));
        // Touch 1 so 2 becomes the eviction candidate.
        cache.get(&id(1));
        cache.insert(id(4), block(10));

        assert!(cache.get(&id(1)).is_some());
        assert!(cache.get(&id(2)).is_none());
        assert!(cache.get(&id(3)).is_some());
        assert!(cache.get(&id(4)).is_some());
        assert_eq!(cache.stats().bytes, 30);
    }

    #[test]
    fn oversized_block_is_not_cached() {
        let cache = BlockCache::new(8);
        cache.insert(id(1), block(9));
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn zero_budget_disables_caching() {
        let cache = BlockCache::new(0);
        cache.insert(id(1), block(1));
        assert!(cache.get(&id(1)).is_none());
    }

    #[test]
    fn reinsert_does_not_double_count() {
        let cache = BlockCache::new(100);
        cache.insert(id(1), block(10));
        cache.insert(id(1), block(10));
        assert_eq!(cache.stats().bytes, 10);
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = BlockCache::new(100);
        cache.insert(id(1), block(10));
        cache.insert(id(2), block(20));
        assert!(cache.invalidate(&id(1)));
        assert!(!cache.invalidate(&id(1)));
        assert_eq!(cache.stats().bytes, 20);

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().bytes, 0);
    }

    #[test]
    fn insert_after_invalidation_is_discarded() {
        let cache = BlockCache::new(100);
        let seen = cache.generation();
        // The chunk is deleted while a reader still holds its bytes.
        cache.invalidate(&id(1));
        assert!(!cache.insert_if_unchanged(id(1), block(10), seen));
        assert!(cache.get(&id(1)).is_none());

        let seen = cache.generation();
        assert!(cache.insert_if_unchanged(id(1), block(10), seen));
        assert!(cache.get(&id(1)).is_some());
    }

    #[test]
    fn clear_also_advances_generation() {
        let cache = BlockCache::new(100);
        let seen = cache.generation();
        cache.clear();
        assert_ne!(cache.generation(), seen);
        assert!(!cache.insert_if_unchanged(id(2), block(10), seen));
        assert_eq!(cache.stats().entries, 0);
    }
}
