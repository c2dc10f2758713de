use thiserror::Error;

/// Errors from building a [`ChunkId`](crate::ChunkId) out of text or bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("chunk id is not valid hex: {0}")]
    InvalidHex(String),

    #[error("chunk id must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
