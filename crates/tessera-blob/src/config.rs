use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BlobError, BlobResult};

/// Largest accepted block size.
pub const MAX_BLOCK_SIZE: usize = 256 * 1024 * 1024;

/// Smallest accepted block size. An index chunk of this size holds at least
/// two encoded parts of any length, so index trees always branch.
pub const MIN_BLOCK_SIZE: usize = 128;

/// Tuning knobs for a [`BlobStore`](crate::BlobStore).
///
/// Missing fields in a TOML document take their default values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    /// Maximum bytes per chunk when splitting a write.
    pub block_size: usize,
    /// Tail blocks of at most this many bytes are inlined in the id.
    pub block_size_min: usize,
    /// Byte budget of the block cache. Zero disables caching.
    pub cache_size_bytes: usize,
    /// Chunks modified less than this many milliseconds before a sweep are
    /// never collected by it.
    pub min_sweep_age_ms: u64,
    /// Recompute the content hash of every chunk fetched from the backend.
    pub verify_reads: bool,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            block_size: 2 * 1024 * 1024,
            block_size_min: 4096,
            cache_size_bytes: 8 * 1024 * 1024,
            min_sweep_age_ms: 1000,
            verify_reads: true,
        }
    }
}

impl BlobStoreConfig {
    pub fn validate(&self) -> BlobResult<()> {
        validate_block_sizes(self.block_size, self.block_size_min)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> BlobResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| BlobError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> BlobResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BlobError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> BlobResult<String> {
        toml::to_string(self).map_err(|e| BlobError::Config(e.to_string()))
    }
}

pub(crate) fn validate_block_sizes(block_size: usize, block_size_min: usize) -> BlobResult<()> {
    if block_size < MIN_BLOCK_SIZE {
        return Err(BlobError::Config(format!(
            "block_size {block_size} is below the minimum of {MIN_BLOCK_SIZE}"
        )));
    }
    if block_size > MAX_BLOCK_SIZE {
        return Err(BlobError::Config(format!(
            "block_size {block_size} exceeds the maximum of {MAX_BLOCK_SIZE}"
        )));
    }
    if block_size_min >= block_size {
        return Err(BlobError::Config(format!(
            "block_size_min {block_size_min} must be smaller than block_size {block_size}"
        )));
    }
    Ok(())
}
