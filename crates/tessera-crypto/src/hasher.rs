use tessera_types::ChunkId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so chunk addresses can never collide with hashes some other
/// subsystem computes over the same bytes.
///
/// Data blocks and index blocks (stored part lists) share [`ContentHasher::CHUNK`]:
/// both are plain chunks to the store, and identical bytes must dedupe
/// regardless of how they were produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for stored chunks.
    pub const CHUNK: Self = Self {
        domain: "tessera-chunk-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Compute the address of a block of bytes.
    pub fn hash(&self, data: &[u8]) -> ChunkId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ChunkId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected chunk id.
    pub fn verify(&self, data: &[u8], expected: &ChunkId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::CHUNK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHasher::CHUNK.hash(data), ContentHasher::CHUNK.hash(data));
    }

    #[test]
    fn different_bytes_produce_different_ids() {
        assert_ne!(
            ContentHasher::CHUNK.hash(&[0u8; 10]),
            ContentHasher::CHUNK.hash(&[1u8; 10])
        );
    }

    #[test]
    fn domain_separates_from_raw_blake3() {
        let raw = *blake3::hash(b"test").as_bytes();
        assert_ne!(*ContentHasher::CHUNK.hash(b"test").as_bytes(), raw);
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("my-custom-domain-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::CHUNK.hash(b"data"));
        assert_eq!(hasher.domain(), "my-custom-domain-v1");
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentHasher::CHUNK.hash(b"original");
        assert!(ContentHasher::CHUNK.verify(b"original", &id));
        assert!(!ContentHasher::CHUNK.verify(b"tampered", &id));
    }

    #[test]
    fn empty_input_has_an_address() {
        let id = ContentHasher::default().hash(&[]);
        assert_eq!(id, ContentHasher::CHUNK.hash(b""));
    }
}
