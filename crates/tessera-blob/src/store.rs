use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tessera_crypto::ContentHasher;
use tessera_store::{ChunkIdIter, ChunkStore};
use tessera_types::{ChunkId, Clock, SystemClock, Timestamp};
use tracing::debug;

use crate::cache::{BlockCache, CacheStats};
use crate::chunker::Chunker;
use crate::config::{validate_block_sizes, BlobStoreConfig};
use crate::error::{BlobError, BlobResult};
use crate::gc::{GarbageCollector, GcReport};
use crate::id::{encode_parts, total_length, BlobId, BlobPart, IdError};
use crate::reader::BlobReader;
use crate::refs::ChunkRefs;

/// Chunked, deduplicated blob store over a [`ChunkStore`].
///
/// Writes split the input into blocks of `block_size` bytes, store each
/// block once under its content hash and return a [`BlobId`] listing the
/// blocks in order. A tail block of at most `block_size_min` bytes is carried
/// inline in the id instead. Long part lists are themselves stored as index
/// chunks, so ids stay small however large the blob.
///
/// Blob ids cross this API as text; see [`crate::id`] for the grammar.
pub struct BlobStore {
    chunks: Arc<dyn ChunkStore>,
    cache: Arc<BlockCache>,
    gc: GarbageCollector,
    clock: Arc<dyn Clock>,
    hasher: ContentHasher,
    block_size: AtomicUsize,
    block_size_min: usize,
    verify_reads: bool,
}

impl BlobStore {
    /// Create a store reading the system clock.
    pub fn new(chunks: Arc<dyn ChunkStore>, config: BlobStoreConfig) -> BlobResult<Self> {
        Self::with_clock(chunks, config, Arc::new(SystemClock::new()))
    }

    /// Create a store with an explicit clock.
    pub fn with_clock(
        chunks: Arc<dyn ChunkStore>,
        config: BlobStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> BlobResult<Self> {
        config.validate()?;
        let cache = Arc::new(BlockCache::new(config.cache_size_bytes));
        let gc = GarbageCollector::new(
            Arc::clone(&chunks),
            Arc::clone(&cache),
            Arc::clone(&clock),
            config.min_sweep_age_ms,
        );
        Ok(Self {
            chunks,
            cache,
            gc,
            clock,
            hasher: ContentHasher::CHUNK,
            block_size: AtomicUsize::new(config.block_size),
            block_size_min: config.block_size_min,
            verify_reads: config.verify_reads,
        })
    }

    // -----------------------------------------------------------------------
    // Write
    // -----------------------------------------------------------------------

    /// Consume `reader` and store its bytes as a blob.
    ///
    /// The reader is dropped exactly once before this returns, on success
    /// and on every error path. A read failure surfaces as
    /// [`BlobError::Write`] carrying the reader's own error.
    pub fn write<R: Read>(&self, reader: R) -> BlobResult<String> {
        Ok(self.write_blob(reader)?.to_string())
    }

    /// Like [`write`](Self::write), returning the structured id.
    ///
    /// Data chunk parts collect into a tree of index chunks, one pending
    /// list per level. A list that would outgrow `block_size` is stored as
    /// an index chunk and its reference moves up a level, so depth grows
    /// with the logarithm of the block count and no chunk exceeds
    /// `block_size`.
    pub fn write_blob<R: Read>(&self, reader: R) -> BlobResult<BlobId> {
        let block_size = self.block_size();
        let mut levels: Vec<PendingList> = Vec::new();
        let mut tail = None;

        for block in Chunker::new(block_size).blocks(reader) {
            let block = block.map_err(|source| BlobError::Write { source })?;
            if block.len() <= self.block_size_min {
                tail = Some(BlobPart::Inline(block));
                continue;
            }
            let id = self.chunks.put(&block, self.clock.now())?;
            let part = BlobPart::Chunk {
                id,
                len: block.len() as u64,
            };
            self.push_part(&mut levels, 0, part, block_size)?;
        }

        let mut parts = self.collapse_levels(levels, block_size)?;
        parts.extend(tail);
        let encoded: usize = parts.iter().map(BlobPart::encoded_len).sum();
        if parts.len() > 1 && encoded > self.block_size_min && encoded <= block_size {
            parts = vec![self.store_index(parts)?];
        }

        let id = BlobId::from_parts(parts)?;
        debug!(len = id.length(), parts = id.parts().len(), "wrote blob");
        Ok(id)
    }

    /// Append `part` to the list at `depth`, first storing that list as an
    /// index chunk if `part` would push its encoding past `capacity`.
    fn push_part(
        &self,
        levels: &mut Vec<PendingList>,
        mut depth: usize,
        mut part: BlobPart,
        capacity: usize,
    ) -> BlobResult<()> {
        loop {
            if levels.len() == depth {
                levels.push(PendingList::default());
            }
            let list = &mut levels[depth];
            if list.parts.is_empty() || list.encoded + part.encoded_len() <= capacity {
                list.push(part);
                return Ok(());
            }
            let full = list.take();
            list.push(part);
            part = self.store_index(full)?;
            depth += 1;
        }
    }

    /// Move every pending list into the top one. Returns the top list.
    fn collapse_levels(&self, mut levels: Vec<PendingList>, capacity: usize) -> BlobResult<Vec<BlobPart>> {
        let mut depth = 0;
        while depth + 1 < levels.len() {
            let mut pending = levels[depth].take();
            let carried = match pending.len() {
                0 => None,
                1 => pending.pop(),
                _ => Some(self.store_index(pending)?),
            };
            if let Some(part) = carried {
                self.push_part(&mut levels, depth + 1, part, capacity)?;
            }
            depth += 1;
        }
        Ok(levels.pop().map(|top| top.parts).unwrap_or_default())
    }

    /// Store the contents of a local file as a blob.
    ///
    /// A missing file fails with [`BlobError::ResourceNotFound`], distinct
    /// from a failure while reading it.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> BlobResult<String> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => BlobError::ResourceNotFound {
                path: path.to_path_buf(),
            },
            _ => BlobError::Write { source },
        })?;
        self.write(file)
    }

    fn store_index(&self, parts: Vec<BlobPart>) -> BlobResult<BlobPart> {
        let bytes = encode_parts(&parts);
        let len = total_length(&parts)?;
        let level = 1 + parts.iter().map(BlobPart::level).max().unwrap_or(0);
        let id = self.chunks.put(&bytes, self.clock.now())?;
        debug!(chunk = %id.short_hex(), level, entries = parts.len(), "stored index chunk");
        Ok(BlobPart::Indirect {
            id,
            level,
            len,
            index_len: bytes.len() as u64,
        })
    }

    // -----------------------------------------------------------------------
    // Read
    // -----------------------------------------------------------------------

    /// Length of a blob in bytes. Needs no chunk access.
    pub fn length(&self, id: &str) -> BlobResult<u64> {
        Ok(BlobId::parse(id)?.length())
    }

    /// Read from `pos` into `buf`. See [`read_into`](Self::read_into).
    pub fn read(&self, id: &str, pos: u64, buf: &mut [u8]) -> BlobResult<Option<usize>> {
        let len = buf.len();
        self.read_into(id, pos, buf, 0, len)
    }

    /// Copy up to `max_len` bytes of the blob, starting at `pos`, into
    /// `buf[buf_offset..]`.
    ///
    /// Returns `None` when `pos` is at or past the end of the blob (always,
    /// for the empty blob). Otherwise returns the number of bytes copied,
    /// which stops at the end of the first chunk touched; callers loop to
    /// read across chunk boundaries.
    pub fn read_into(
        &self,
        id: &str,
        pos: u64,
        buf: &mut [u8],
        buf_offset: usize,
        max_len: usize,
    ) -> BlobResult<Option<usize>> {
        let blob = BlobId::parse(id)?;
        if pos >= blob.length() {
            return Ok(None);
        }
        let end = buf_offset
            .checked_add(max_len)
            .filter(|&end| end <= buf.len())
            .ok_or(BlobError::BufferRange {
                offset: buf_offset,
                len: max_len,
                buffer_len: buf.len(),
            })?;
        self.read_blob(&blob, pos, &mut buf[buf_offset..end])
    }

    /// Read from a parsed id. Same contract as [`read`](Self::read).
    pub fn read_blob(&self, blob: &BlobId, pos: u64, buf: &mut [u8]) -> BlobResult<Option<usize>> {
        if pos >= blob.length() {
            return Ok(None);
        }
        if buf.is_empty() {
            return Ok(Some(0));
        }
        self.read_parts(blob.parts(), pos, buf).map(Some)
    }

    fn read_parts(&self, parts: &[BlobPart], pos: u64, buf: &mut [u8]) -> BlobResult<usize> {
        let mut pos = pos;
        let mut inner: Vec<BlobPart>;
        let mut parts = parts;
        loop {
            let Some(part) = parts.iter().find(|part| {
                let len = part.length();
                if pos < len {
                    return true;
                }
                pos -= len;
                false
            }) else {
                return Ok(0);
            };
            let start = pos as usize;
            match part {
                BlobPart::Inline(data) => return Ok(copy_from(&data[..], start, buf)),
                BlobPart::Chunk { id, len } => {
                    let data = self.fetch(id, *len)?;
                    return Ok(copy_from(&data, start, buf));
                }
                BlobPart::Indirect { .. } => {
                    inner = self.decode_index(part)?;
                    parts = &inner;
                }
            }
        }
    }

    /// Read a whole blob into memory.
    pub fn read_fully(&self, id: &str) -> BlobResult<Vec<u8>> {
        let blob = BlobId::parse(id)?;
        let capacity = usize::try_from(blob.length()).unwrap_or(usize::MAX);
        let mut out = Vec::with_capacity(capacity.min(self.block_size() * 4));
        self.append_parts(blob.parts(), &mut out)?;
        Ok(out)
    }

    fn append_parts(&self, parts: &[BlobPart], out: &mut Vec<u8>) -> BlobResult<()> {
        let mut stack = vec![parts.to_vec().into_iter()];
        while let Some(top) = stack.last_mut() {
            let Some(part) = top.next() else {
                stack.pop();
                continue;
            };
            match &part {
                BlobPart::Inline(data) => out.extend_from_slice(data),
                BlobPart::Chunk { id, len } => out.extend_from_slice(&self.fetch(id, *len)?),
                BlobPart::Indirect { .. } => stack.push(self.decode_index(&part)?.into_iter()),
            }
        }
        Ok(())
    }

    /// A seekable stream over a blob.
    pub fn reader(&self, id: &str) -> BlobResult<BlobReader<'_>> {
        Ok(BlobReader::new(self, BlobId::parse(id)?))
    }

    /// Chunk bytes, from the cache or the backend.
    fn fetch(&self, id: &ChunkId, expected_len: u64) -> BlobResult<Bytes> {
        let data = match self.cache.get(id) {
            Some(data) => data,
            None => {
                let generation = self.cache.generation();
                let data = self
                    .chunks
                    .get(id)?
                    .ok_or(BlobError::MissingChunk(*id))?;
                if self.verify_reads && !self.hasher.verify(&data, id) {
                    return Err(BlobError::CorruptChunk {
                        id: *id,
                        computed: self.hasher.hash(&data),
                    });
                }
                self.cache.insert_if_unchanged(*id, data.clone(), generation);
                data
            }
        };
        if data.len() as u64 != expected_len {
            return Err(BlobError::LengthMismatch {
                id: *id,
                expected: expected_len,
                actual: data.len() as u64,
            });
        }
        Ok(data)
    }

    /// Fetch and decode the part list held by an index chunk.
    ///
    /// Every inner part must sit at a lower level than the index and the
    /// inner lengths must add up to the length the reference records.
    pub(crate) fn decode_index(&self, index: &BlobPart) -> BlobResult<Vec<BlobPart>> {
        let BlobPart::Indirect {
            id,
            level,
            len,
            index_len,
        } = index
        else {
            return Ok(Vec::new());
        };
        let data = self.fetch(id, *index_len)?;
        let parts = BlobId::decode(&data)?.into_parts();
        if let Some(bad) = parts.iter().find(|p| p.level() >= *level) {
            return Err(IdError::LevelNotDecreasing {
                index: *id,
                level: *level,
                found: bad.level(),
            }
            .into());
        }
        let actual = total_length(&parts)?;
        if actual != *len {
            return Err(IdError::IndexLengthMismatch {
                index: *id,
                expected: *len,
                actual,
            }
            .into());
        }
        Ok(parts)
    }

    // -----------------------------------------------------------------------
    // Chunk-level access
    // -----------------------------------------------------------------------

    /// Lazily list the physical chunks a blob references, index chunks
    /// included. Each call parses the id afresh.
    pub fn resolve_chunks(&self, id: &str) -> BlobResult<ChunkRefs<'_>> {
        Ok(ChunkRefs::new(self, BlobId::parse(id)?.into_parts()))
    }

    /// Lazily list every stored chunk, optionally only those last modified
    /// at or before `max_last_modified`. Reachability plays no part.
    pub fn all_chunk_ids(&self, max_last_modified: Option<Timestamp>) -> BlobResult<ChunkIdIter<'_>> {
        let ids = self.chunks.ids()?;
        let Some(max) = max_last_modified else {
            return Ok(ids);
        };
        let chunks = &self.chunks;
        Ok(Box::new(ids.filter_map(move |id| {
            let id = match id {
                Ok(id) => id,
                Err(e) => return Some(Err(e)),
            };
            match chunks.metadata(&id) {
                Ok(Some(meta)) if meta.last_modified <= max => Some(Ok(id)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        })))
    }

    /// Remove one physical chunk unconditionally. Returns `false` if it was
    /// not stored.
    ///
    /// Any blob still referencing the chunk becomes unreadable.
    pub fn delete_chunk(&self, id: &ChunkId) -> BlobResult<bool> {
        let deleted = self.chunks.delete(id)?;
        self.cache.invalidate(id);
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Garbage collection
    // -----------------------------------------------------------------------

    /// Unmark every chunk.
    pub fn clear_in_use(&self) -> BlobResult<()> {
        self.gc.clear_in_use()
    }

    /// Open a marking epoch. Chunks written from now on survive the next
    /// sweep regardless of marks.
    pub fn start_mark(&self) -> Timestamp {
        self.gc.start_mark()
    }

    /// Mark every chunk `id` references, descending into index chunks.
    ///
    /// Fails with [`BlobError::Gc`] outside a marking epoch.
    pub fn mark(&self, id: &str) -> BlobResult<()> {
        let refs = self.resolve_chunks(id)?;
        self.gc.ensure_marking("mark")?;
        for chunk in refs {
            self.gc.mark_chunk(&chunk?)?;
        }
        Ok(())
    }

    /// Delete unmarked chunks older than the epoch and the minimum age.
    /// Returns how many were deleted.
    pub fn sweep(&self) -> BlobResult<usize> {
        Ok(self.sweep_report()?.deleted)
    }

    /// Like [`sweep`](Self::sweep), with the full report.
    pub fn sweep_report(&self) -> BlobResult<GcReport> {
        self.gc.sweep()
    }

    /// The collector behind the mark and sweep calls, for phase queries.
    pub fn collector(&self) -> &GarbageCollector {
        &self.gc
    }

    /// Drop every cached chunk. Reads fall through to the backend.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Hit and miss counts and current occupancy of the block cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Block size used by the next write.
    pub fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Relaxed)
    }

    /// Change the block size used by subsequent writes. Existing ids are
    /// unaffected.
    pub fn set_block_size(&self, block_size: usize) -> BlobResult<()> {
        validate_block_sizes(block_size, self.block_size_min)?;
        self.block_size.store(block_size, Ordering::Relaxed);
        Ok(())
    }

    /// Largest tail block carried inline in the id.
    pub fn block_size_min(&self) -> usize {
        self.block_size_min
    }

    /// The backend holding data and index chunks.
    pub fn chunk_store(&self) -> &Arc<dyn ChunkStore> {
        &self.chunks
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("block_size", &self.block_size())
            .field("block_size_min", &self.block_size_min)
            .field("verify_reads", &self.verify_reads)
            .field("cache", &self.cache)
            .field("gc", &self.gc)
            .finish()
    }
}

/// Parts waiting to be stored together as one index chunk.
#[derive(Default)]
struct PendingList {
    parts: Vec<BlobPart>,
    encoded: usize,
}

impl PendingList {
    fn push(&mut self, part: BlobPart) {
        self.encoded += part.encoded_len();
        self.parts.push(part);
    }

    fn take(&mut self) -> Vec<BlobPart> {
        self.encoded = 0;
        std::mem::take(&mut self.parts)
    }
}

fn copy_from(src: &[u8], start: usize, dst: &mut [u8]) -> usize {
    let n = dst.len().min(src.len() - start);
    dst[..n].copy_from_slice(&src[start..start + n]);
    n
}
