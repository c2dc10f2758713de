use std::io::{self, Read};

/// Splits a byte stream into fixed-size blocks.
///
/// Every block except the last holds exactly `block_size` bytes; the last
/// holds the remainder and is never empty. An empty stream yields nothing.
#[derive(Clone, Copy, Debug)]
pub struct Chunker {
    block_size: usize,
}

impl Chunker {
    /// Create a chunker. `block_size` must be non-zero.
    pub fn new(block_size: usize) -> Self {
        debug_assert!(block_size > 0, "block size must be non-zero");
        Self { block_size }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Iterate over the blocks of `reader`, consuming it.
    pub fn blocks<R: Read>(&self, reader: R) -> Blocks<R> {
        Blocks {
            reader,
            block_size: self.block_size,
            done: false,
        }
    }
}

/// Iterator returned by [`Chunker::blocks`].
///
/// Yields each block as soon as it is full. After the first error or the end
/// of the stream it yields nothing more.
#[derive(Debug)]
pub struct Blocks<R> {
    reader: R,
    block_size: usize,
    done: bool,
}

impl<R: Read> Blocks<R> {
    fn fill(&mut self) -> io::Result<Vec<u8>> {
        let mut block = vec![0u8; self.block_size];
        let mut filled = 0;
        while filled < block.len() {
            match self.reader.read(&mut block[filled..]) {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        block.truncate(filled);
        Ok(block)
    }
}

impl<R: Read> Iterator for Blocks<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fill() {
            Ok(block) if block.is_empty() => None,
            Ok(block) => Some(Ok(block)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `step` bytes per read call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("boom"))
        }
    }

    fn sizes(block_size: usize, len: usize) -> Vec<usize> {
        let data = vec![1u8; len];
        Chunker::new(block_size)
            .blocks(&data[..])
            .map(|b| b.unwrap().len())
            .collect()
    }

    #[test]
    fn empty_stream_yields_no_blocks() {
        assert!(sizes(16, 0).is_empty());
    }

    #[test]
    fn exact_multiple_has_no_trailing_block() {
        assert_eq!(sizes(16, 32), vec![16, 16]);
    }

    #[test]
    fn remainder_goes_last() {
        assert_eq!(sizes(16, 37), vec![16, 16, 5]);
        assert_eq!(sizes(16, 3), vec![3]);
    }

    #[test]
    fn short_reads_are_coalesced() {
        let data: Vec<u8> = (0..100u8).collect();
        let blocks: Vec<Vec<u8>> = Chunker::new(30)
            .blocks(Trickle { data: &data, step: 7 })
            .map(Result::unwrap)
            .collect();
        assert_eq!(blocks.iter().map(Vec::len).collect::<Vec<_>>(), vec![30, 30, 30, 10]);
        assert_eq!(blocks.concat(), data);
    }

    #[test]
    fn error_is_yielded_once_then_fused() {
        let mut blocks = Chunker::new(8).blocks(Failing);
        let err = blocks.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(blocks.next().is_none());
    }
}
