use tessera_types::ChunkId;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding store state was poisoned by a panicking thread.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    /// An on-disk entry exists but cannot be interpreted.
    #[error("corrupt chunk entry {id}: {reason}")]
    CorruptEntry { id: ChunkId, reason: String },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
