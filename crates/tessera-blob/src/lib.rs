//! Chunked, deduplicated blob storage with mark-and-sweep collection.
//!
//! A blob is an immutable byte sequence of any size. [`BlobStore::write`]
//! splits it into fixed-size blocks, stores each distinct block once in a
//! [`ChunkStore`](tessera_store::ChunkStore) and returns a textual blob id.
//! The id alone is enough to compute the blob's length and to read any byte
//! range of it.
//!
//! # Blob ids
//!
//! - `""` is the empty blob.
//! - Small payloads are carried inline in the id; no chunk is stored.
//! - Larger payloads list their chunks, with long lists folded into index
//!   chunks.
//! - Concatenating the text of two ids yields the id of the concatenated
//!   blobs.
//!
//! # Garbage collection
//!
//! Callers re-supply the set of live ids every cycle:
//!
//! ```text
//! store.clear_in_use()?;
//! store.start_mark();
//! for id in live { store.mark(id)?; }
//! let deleted = store.sweep()?;
//! ```
//!
//! Writers keep running throughout. Chunks written or re-written after
//! `start_mark`, or more recently than `min_sweep_age_ms`, survive the sweep.

pub mod cache;
pub mod chunker;
pub mod config;
pub mod error;
pub mod gc;
pub mod id;
pub mod reader;
pub mod refs;
pub mod store;

pub use cache::{BlockCache, CacheStats};
pub use chunker::Chunker;
pub use config::BlobStoreConfig;
pub use error::{BlobError, BlobResult};
pub use gc::{GarbageCollector, GcError, GcPhase, GcReport};
pub use id::{BlobId, BlobPart, IdError};
pub use reader::BlobReader;
pub use refs::ChunkRefs;
pub use store::BlobStore;
