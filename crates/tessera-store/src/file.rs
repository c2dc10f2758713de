//! Filesystem chunk store.
//!
//! # Directory Layout
//!
//! ```text
//! <root>/
//! └── ab/
//!     └── cd/
//!         ├── abcd1234...ef        # chunk bytes, mtime = last_modified
//!         └── abcd1234...ef.mark   # present while the chunk is marked
//! ```
//!
//! Chunks are written to a temp file in the target directory and renamed
//! into place, so readers never observe a partially written chunk.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use filetime::FileTime;
use tempfile::NamedTempFile;
use tessera_crypto::ContentHasher;
use tessera_types::{ChunkId, Timestamp};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chunk::ChunkMeta;
use crate::error::{StoreError, StoreResult};
use crate::traits::{ChunkIdIter, ChunkStore};

const MARK_EXTENSION: &str = "mark";

/// Chunk store keeping one file per chunk.
///
/// The last-modified timestamp lives in the file's mtime and is always set
/// from the caller's clock, never from the filesystem's. Metadata changes
/// (refresh, mark, sweep) are serialized through a process-local lock;
/// writers in other processes are protected only by the sweep age margin.
#[derive(Debug)]
pub struct FileChunkStore {
    root: PathBuf,
    meta_lock: Mutex<()>,
}

impl FileChunkStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            meta_lock: Mutex::new(()),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chunk_dir(&self, id: &ChunkId) -> PathBuf {
        let (l1, l2) = id.fan_out();
        self.root.join(l1).join(l2)
    }

    fn chunk_path(&self, id: &ChunkId) -> PathBuf {
        self.chunk_dir(id).join(id.to_hex())
    }

    fn mark_path(&self, id: &ChunkId) -> PathBuf {
        self.chunk_path(id).with_extension(MARK_EXTENSION)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.meta_lock
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn read_meta(&self, id: &ChunkId) -> StoreResult<Option<ChunkMeta>> {
        let meta = match fs::metadata(self.chunk_path(id)) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(StoreError::CorruptEntry {
                id: *id,
                reason: "chunk path is not a regular file".into(),
            });
        }
        Ok(Some(ChunkMeta {
            size: meta.len(),
            last_modified: from_file_time(FileTime::from_last_modification_time(&meta)),
            marked: self.mark_path(id).try_exists()?,
        }))
    }

    /// Remove the chunk file and its mark, returning whether the chunk existed.
    fn remove_chunk(&self, id: &ChunkId) -> StoreResult<bool> {
        let existed = remove_if_exists(&self.chunk_path(id))?;
        remove_if_exists(&self.mark_path(id))?;
        Ok(existed)
    }
}

impl ChunkStore for FileChunkStore {
    fn put(&self, data: &[u8], now: Timestamp) -> StoreResult<ChunkId> {
        let id = ContentHasher::CHUNK.hash(data);
        let path = self.chunk_path(&id);

        // Fast path: refresh an existing chunk without writing its bytes again.
        {
            let _guard = self.lock()?;
            if let Some(meta) = self.read_meta(&id)? {
                if meta.last_modified < now {
                    filetime::set_file_mtime(&path, to_file_time(now))?;
                }
                return Ok(id);
            }
        }

        let dir = self.chunk_dir(&id);
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;

        let _guard = self.lock()?;
        if let Some(meta) = self.read_meta(&id)? {
            // Another writer won the race; same bytes, so keep theirs.
            if meta.last_modified < now {
                filetime::set_file_mtime(&path, to_file_time(now))?;
            }
            return Ok(id);
        }
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        filetime::set_file_mtime(&path, to_file_time(now))?;
        debug!(chunk = %id.short_hex(), len = data.len(), "stored chunk file");
        Ok(id)
    }

    fn get(&self, id: &ChunkId) -> StoreResult<Option<Bytes>> {
        match fs::read(self.chunk_path(id)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn metadata(&self, id: &ChunkId) -> StoreResult<Option<ChunkMeta>> {
        self.read_meta(id)
    }

    fn delete(&self, id: &ChunkId) -> StoreResult<bool> {
        let _guard = self.lock()?;
        self.remove_chunk(id)
    }

    fn ids(&self) -> StoreResult<ChunkIdIter<'_>> {
        let walker = WalkDir::new(&self.root)
            .min_depth(3)
            .max_depth(3)
            .into_iter()
            .filter_map(|entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => return Some(Err(StoreError::Io(e.into()))),
                };
                if !entry.file_type().is_file() {
                    return None;
                }
                // Temp files and mark files share the directory; only bare
                // 64-char hex names are chunks.
                let name = entry.file_name().to_str()?;
                match ChunkId::from_hex(name) {
                    Ok(id) => Some(Ok(id)),
                    Err(_) => {
                        if !name.ends_with(MARK_EXTENSION) && !name.starts_with(".tmp") {
                            warn!(path = %entry.path().display(), "skipping unrecognized file in chunk store");
                        }
                        None
                    }
                }
            });
        Ok(Box::new(walker))
    }

    fn set_marked(&self, id: &ChunkId, marked: bool) -> StoreResult<bool> {
        let _guard = self.lock()?;
        if !self.chunk_path(id).try_exists()? {
            return Ok(false);
        }
        if marked {
            File::create(self.mark_path(id))?;
        } else {
            remove_if_exists(&self.mark_path(id))?;
        }
        Ok(true)
    }

    fn clear_marks(&self) -> StoreResult<()> {
        let _guard = self.lock()?;
        for entry in WalkDir::new(&self.root).min_depth(3).max_depth(3) {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            if entry.path().extension().is_some_and(|ext| ext == MARK_EXTENSION) {
                remove_if_exists(entry.path())?;
            }
        }
        Ok(())
    }

    fn sweep_chunk(&self, id: &ChunkId, cutoff: Timestamp) -> StoreResult<Option<u64>> {
        let _guard = self.lock()?;
        match self.read_meta(id)? {
            Some(meta) if meta.is_collectable(cutoff) => {
                self.remove_chunk(id)?;
                Ok(Some(meta.size))
            }
            _ => Ok(None),
        }
    }
}

fn to_file_time(ts: Timestamp) -> FileTime {
    let ms = ts.as_millis();
    FileTime::from_unix_time((ms / 1000) as i64, ((ms % 1000) * 1_000_000) as u32)
}

fn from_file_time(ft: FileTime) -> Timestamp {
    let secs = ft.unix_seconds().max(0) as u64;
    Timestamp::from_millis(secs * 1000 + u64::from(ft.nanoseconds()) / 1_000_000)
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
