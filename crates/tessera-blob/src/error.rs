use std::path::PathBuf;

use tessera_store::StoreError;
use tessera_types::ChunkId;
use thiserror::Error;

use crate::gc::GcError;
use crate::id::IdError;

/// Errors surfaced by the blob store.
///
/// Nothing is retried or suppressed internally; every variant reaches the
/// caller.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The blob identifier text is malformed, truncated or unrecognized.
    #[error("invalid blob id: {0}")]
    InvalidId(#[from] IdError),

    /// The write source failed while being consumed. The source's own
    /// message is part of this error's message.
    #[error("failed to read blob source: {source}")]
    Write { source: std::io::Error },

    /// A named write source does not exist.
    #[error("blob source not found: {}", path.display())]
    ResourceNotFound { path: PathBuf },

    /// A chunk referenced by a blob id is not in the store.
    #[error("chunk not found: {0}")]
    MissingChunk(ChunkId),

    /// A chunk's bytes do not hash to its id.
    #[error("chunk {id} is corrupt: content hashes to {computed}")]
    CorruptChunk { id: ChunkId, computed: ChunkId },

    /// A chunk's size disagrees with the length recorded in the blob id.
    #[error("chunk {id} holds {actual} bytes but the blob id records {expected}")]
    LengthMismatch { id: ChunkId, expected: u64, actual: u64 },

    /// The destination range passed to a read lies outside the buffer.
    #[error("buffer range {offset}..{offset}+{len} exceeds buffer of {buffer_len} bytes")]
    BufferRange {
        offset: usize,
        len: usize,
        buffer_len: usize,
    },

    /// Garbage collection was driven out of order.
    #[error(transparent)]
    Gc(#[from] GcError),

    /// The store configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The chunk backend failed.
    #[error("chunk store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;
