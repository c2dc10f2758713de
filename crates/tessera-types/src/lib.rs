//! Foundation types for Tessera.
//!
//! Every other Tessera crate depends on `tessera-types`. It carries only the
//! small value types that cross crate boundaries: chunk identity and time.
//!
//! # Key Types
//!
//! - [`ChunkId`] -- content address of a stored chunk (32-byte hash)
//! - [`Timestamp`] -- wall-clock milliseconds used for chunk ages
//! - [`Clock`] -- time source passed explicitly into store mutations
//!   ([`SystemClock`] in production, [`ManualClock`] in tests)

pub mod chunk;
pub mod error;
pub mod temporal;

pub use chunk::ChunkId;
pub use error::TypeError;
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
