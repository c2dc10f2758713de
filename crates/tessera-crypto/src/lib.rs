//! Content addressing for Tessera.
//!
//! A chunk's identity is the domain-separated BLAKE3 hash of its bytes. The
//! addresser is a pure function: no keys, no state, no custom cryptography.

pub mod hasher;

pub use hasher::ContentHasher;
