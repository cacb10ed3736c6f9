//! Audio blocks and chunks.
//!
//! Grounded on `compio-buf`'s `Slice<T>` (`begin`/`end`/`as_inner`), adapted
//! from an owned buffer moved through an I/O completion to an `Arc`-shared,
//! immutable PCM block: the queue only ever needs a read-only window into
//! one, and "reference-counted" for an immutable type is just `Arc` clone
//! and drop.

use std::sync::Arc;

/// An immutable, reference-counted block of PCM samples.
#[derive(Debug)]
pub struct AudioBlock {
    data: Box<[u8]>,
}

impl AudioBlock {
    /// Wrap an owned byte buffer as a refcounted block.
    pub fn new(data: impl Into<Box<[u8]>>) -> Arc<Self> {
        Arc::new(Self { data: data.into() })
    }

    /// Number of bytes in the underlying block.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A `(block, offset, length)` window into an [`AudioBlock`].
///
/// Cloning a `Chunk` clones the `Arc<AudioBlock>` handle, not the
/// underlying bytes. That clone at enqueue is the refcount increment,
/// and dropping it at `done` is the matching decrement.
#[derive(Debug, Clone)]
pub struct Chunk {
    block: Arc<AudioBlock>,
    offset: usize,
    length: usize,
}

impl Chunk {
    /// Build a chunk, asserting the window fits inside `block`.
    pub fn new(block: Arc<AudioBlock>, offset: usize, length: usize) -> Self {
        assert!(
            offset.checked_add(length).is_some_and(|end| end <= block.len()),
            "chunk window [{offset}, {offset}+{length}) out of bounds for block of length {}",
            block.len()
        );
        Self {
            block,
            offset,
            length,
        }
    }

    pub fn block(&self) -> &Arc<AudioBlock> {
        &self.block
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Borrow the bytes this chunk windows over.
    pub fn as_bytes(&self) -> &[u8] {
        &self.block.data[self.offset..self.offset + self.length]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_windows_into_block() {
        let block = AudioBlock::new(vec![1u8, 2, 3, 4, 5, 6]);
        let chunk = Chunk::new(block.clone(), 2, 3);
        assert_eq!(chunk.as_bytes(), &[3, 4, 5]);
        assert_eq!(Arc::strong_count(&block), 2);
        drop(chunk);
        assert_eq!(Arc::strong_count(&block), 1);
    }

    #[test]
    #[should_panic]
    fn chunk_out_of_bounds_panics() {
        let block = AudioBlock::new(vec![1u8, 2, 3]);
        Chunk::new(block, 2, 5);
    }
}
