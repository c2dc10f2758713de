use std::io::{self, Read, Seek, SeekFrom};

use crate::id::BlobId;
use crate::store::BlobStore;

/// Seekable byte stream over one blob.
///
/// Each `read` call copies from at most one chunk, like
/// [`BlobStore::read`]; `read_to_end` and friends loop as usual. Store
/// errors surface as [`io::Error`]s wrapping the [`BlobError`](crate::BlobError).
pub struct BlobReader<'a> {
    store: &'a BlobStore,
    blob: BlobId,
    len: u64,
    pos: u64,
}

impl<'a> BlobReader<'a> {
    pub(crate) fn new(store: &'a BlobStore, blob: BlobId) -> Self {
        let len = blob.length();
        Self {
            store,
            blob,
            len,
            pos: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn blob_id(&self) -> &BlobId {
        &self.blob
    }
}

impl Read for BlobReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.store.read_blob(&self.blob, self.pos, buf) {
            Ok(Some(n)) => {
                self.pos += n as u64;
                Ok(n)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

impl Seek for BlobReader<'_> {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(pos) => {
                self.pos = pos;
                Ok(pos)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}

impl std::fmt::Debug for BlobReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReader")
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tessera_store::InMemoryChunkStore;

    use super::*;
    use crate::config::BlobStoreConfig;
    use crate::error::BlobError;

    fn store() -> BlobStore {
        let config = BlobStoreConfig {
            block_size: 512,
            block_size_min: 32,
            ..Default::default()
        };
        BlobStore::new(Arc::new(InMemoryChunkStore::new()), config).unwrap()
    }

    fn data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    #[test]
    fn reads_across_chunk_boundaries() {
        let store = store();
        let bytes = data(2_000);
        let id = store.write(&bytes[..]).unwrap();
        let mut reader = store.reader(&id).unwrap();
        assert_eq!(reader.len(), 2_000);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, bytes);
        assert_eq!(reader.position(), 2_000);
    }

    #[test]
    fn seek_then_read() {
        let store = store();
        let bytes = data(2_000);
        let id = store.write(&bytes[..]).unwrap();
        let mut reader = store.reader(&id).unwrap();

        let mut buf = [0u8; 10];
        reader.seek(SeekFrom::Start(700)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &bytes[700..710]);

        reader.seek(SeekFrom::End(-5)).unwrap();
        let mut tail = Vec::new();
        reader.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, &bytes[1_995..]);

        assert_eq!(reader.seek(SeekFrom::Current(-10)).unwrap(), 1_990);
    }

    #[test]
    fn seek_past_end_reads_nothing() {
        let store = store();
        let id = store.write(&data(100)[..]).unwrap();
        let mut reader = store.reader(&id).unwrap();
        reader.seek(SeekFrom::Start(5_000)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn negative_seek_is_rejected() {
        let store = store();
        let mut reader = store.reader("").unwrap();
        assert!(reader.is_empty());
        let err = reader.seek(SeekFrom::Current(-1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn missing_chunk_surfaces_as_io_error() {
        let store = store();
        let blob = store.write_blob(&data(512)[..]).unwrap();
        let chunk = *blob.parts()[0].chunk_id().unwrap();
        store.delete_chunk(&chunk).unwrap();

        let mut reader = store.reader(&blob.to_string()).unwrap();
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<BlobError>());
        assert!(matches!(inner, Some(BlobError::MissingChunk(_))));
    }
}
