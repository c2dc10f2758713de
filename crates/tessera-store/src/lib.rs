//! Content-addressed chunk storage for Tessera.
//!
//! This is the only layer with I/O side effects. Every chunk is an immutable
//! run of bytes identified by the hash of those bytes, plus two pieces of
//! garbage-collection metadata: a last-modified [`Timestamp`] and a mark flag.
//!
//! # Storage Backends
//!
//! All backends implement the [`ChunkStore`] trait:
//!
//! - [`InMemoryChunkStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileChunkStore`] -- one file per chunk under a two-level fan-out
//!
//! # Design Rules
//!
//! 1. Chunks are immutable once written (content addressing guarantees this).
//! 2. Writing bytes that are already stored refreshes the timestamp and
//!    stores nothing new.
//! 3. Time is passed in by the caller; backends never read the clock.
//! 4. Timestamp refresh, mark changes and sweep deletion of a single chunk
//!    are atomic with respect to each other.
//! 5. The store never interprets chunk contents.
//!
//! [`Timestamp`]: tessera_types::Timestamp

pub mod chunk;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use chunk::ChunkMeta;
pub use error::{StoreError, StoreResult};
pub use file::FileChunkStore;
pub use memory::InMemoryChunkStore;
pub use traits::{ChunkIdIter, ChunkStore};
