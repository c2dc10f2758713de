use std::vec;

use tessera_types::ChunkId;

use crate::error::BlobResult;
use crate::id::BlobPart;
use crate::store::BlobStore;

/// Lazy walk over the physical chunks a blob references, in blob order.
///
/// An index chunk is yielded before the chunks it lists, and is only fetched
/// and decoded when the walk moves past it. Inline parts reference nothing
/// and are skipped. After the first error the walk ends.
pub struct ChunkRefs<'a> {
    store: &'a BlobStore,
    stack: Vec<vec::IntoIter<BlobPart>>,
    pending: Option<BlobPart>,
    failed: bool,
}

impl<'a> ChunkRefs<'a> {
    pub(crate) fn new(store: &'a BlobStore, parts: Vec<BlobPart>) -> Self {
        Self {
            store,
            stack: vec![parts.into_iter()],
            pending: None,
            failed: false,
        }
    }

    fn expand_pending(&mut self) -> BlobResult<()> {
        if let Some(index) = self.pending.take() {
            let parts = self.store.decode_index(&index)?;
            self.stack.push(parts.into_iter());
        }
        Ok(())
    }
}

impl Iterator for ChunkRefs<'_> {
    type Item = BlobResult<ChunkId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Err(e) = self.expand_pending() {
            self.failed = true;
            return Some(Err(e));
        }
        loop {
            let top = self.stack.last_mut()?;
            let Some(part) = top.next() else {
                self.stack.pop();
                continue;
            };
            match part {
                BlobPart::Inline(_) => continue,
                BlobPart::Chunk { id, .. } => return Some(Ok(id)),
                BlobPart::Indirect { id, .. } => {
                    self.pending = Some(part);
                    return Some(Ok(id));
                }
            }
        }
    }
}

impl std::fmt::Debug for ChunkRefs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkRefs")
            .field("depth", &self.stack.len())
            .field("failed", &self.failed)
            .finish()
    }
}
