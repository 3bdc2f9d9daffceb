//! Partition storage: the block-chain write/read primitives shared by both
//! stream flavors (§3 "Partition", §6 "Block framing").
//!
//! A partition is touched by exactly one thread during the write phase and
//! is read-only (frozen) during the read phase (§5: "During production,
//! exactly one thread per partition writes; no reader runs. During
//! consumption, no writer runs"), so nothing in here needs atomics of its
//! own — the only shared, concurrently-mutated state in the whole crate is
//! the [`BlockPool`](crate::block_pool::BlockPool) free list.

use crate::block_pool::{Block, BlockPool, BLOCK_SIZE};
use crate::error::{EventBusError, Result};
use crate::plain::PlainData;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

/// One partition's block chain plus bookkeeping. `first`/`last` are `None`
/// until the first write or `begin_partition` call allocates a block.
pub(crate) struct Partition {
    first: Option<NonNull<Block>>,
    last: Option<NonNull<Block>>,
    /// Byte offset into `last` where the next write begins.
    write_offset: usize,
    element_count: usize,
}

impl Default for Partition {
    fn default() -> Self {
        Self {
            first: None,
            last: None,
            write_offset: 0,
            element_count: 0,
        }
    }
}

unsafe impl Send for Partition {}

impl Partition {
    pub(crate) fn element_count(&self) -> usize {
        self.element_count
    }

    pub(crate) fn first_block(&self) -> Option<NonNull<Block>> {
        self.first
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    /// Releases every block in the chain back to `pool`. Called once the
    /// owning stream has been fully consumed and is disposed.
    pub(crate) fn release_blocks(&mut self, pool: &BlockPool) {
        let mut cur = self.first.take();
        self.last = None;
        while let Some(block) = cur {
            let next = unsafe { block.as_ref().next().load(crate::sync::Ordering::Relaxed) };
            pool.release(block);
            cur = NonNull::new(next);
        }
        self.write_offset = 0;
        self.element_count = 0;
    }

    fn ensure_tail_block(&mut self, pool: &BlockPool) -> Result<NonNull<Block>> {
        if let Some(last) = self.last {
            return Ok(last);
        }
        let block = pool.acquire()?;
        self.first = Some(block);
        self.last = Some(block);
        self.write_offset = 0;
        Ok(block)
    }

    fn push_new_block(&mut self, pool: &BlockPool) -> Result<NonNull<Block>> {
        let new_block = pool.acquire()?;
        if let Some(last) = self.last {
            unsafe {
                last.as_ref()
                    .next()
                    .store(new_block.as_ptr(), crate::sync::Ordering::Release);
            }
        } else {
            self.first = Some(new_block);
        }
        self.last = Some(new_block);
        self.write_offset = 0;
        Ok(new_block)
    }

    /// Writes `value` into the partition, natural-aligned to 4 bytes,
    /// allocating a fresh block when the tail has insufficient space.
    /// Payloads up to one block size are never split (§4.2).
    pub(crate) fn write<T: PlainData>(&mut self, pool: &BlockPool, value: T) -> Result<()> {
        let size = size_of::<T>();
        let align = align_of::<T>().max(4);
        debug_assert!(
            size <= BLOCK_SIZE,
            "payload of size {size} cannot fit a single {BLOCK_SIZE}-byte block"
        );

        let mut block = self.ensure_tail_block(pool)?;
        let mut offset = align_up(self.write_offset, align);
        if offset + size > BLOCK_SIZE {
            block = self.push_new_block(pool)?;
            offset = 0;
        }

        unsafe {
            let ptr = block.as_ref().data_ptr().add(offset) as *mut T;
            ptr.write_unaligned(value);
        }
        self.write_offset = offset + size;
        self.element_count += 1;
        Ok(())
    }

    /// Writes a 4-byte little-endian length prefix followed by `bytes`,
    /// permitted to straddle any number of blocks (§6 "Large writes").
    pub(crate) fn write_large(&mut self, pool: &BlockPool, bytes: &[u8]) -> Result<()> {
        let len = bytes.len() as u32;
        self.write_raw_bytes(pool, &len.to_le_bytes())?;
        self.write_raw_bytes(pool, bytes)?;
        self.element_count += 1;
        Ok(())
    }

    fn write_raw_bytes(&mut self, pool: &BlockPool, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            self.ensure_tail_block(pool)?;
            let block = if self.write_offset == BLOCK_SIZE {
                self.push_new_block(pool)?
            } else {
                self.last.unwrap()
            };

            let space = BLOCK_SIZE - self.write_offset;
            let take = space.min(bytes.len());
            unsafe {
                let dst = block.as_ref().data_ptr().add(self.write_offset);
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, take);
            }
            self.write_offset += take;
            bytes = &bytes[take..];
        }
        Ok(())
    }
}

#[inline]
fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_pool::BlockPoolConfig;

    #[test]
    fn write_then_release_frees_all_blocks() {
        let pool = BlockPool::new(BlockPoolConfig::default());
        let mut partition = Partition::default();
        for i in 0..2000u32 {
            partition.write(&pool, i).unwrap();
        }
        assert_eq!(partition.element_count(), 2000);
        assert!(pool.allocated_count() > 1, "2000 u32s should span multiple 4KiB blocks");
        partition.release_blocks(&pool);
        assert_eq!(pool.pooled_count(), pool.allocated_count());
    }

    #[test]
    fn large_write_spans_blocks() {
        let pool = BlockPool::new(BlockPoolConfig::default());
        let mut partition = Partition::default();
        let payload = vec![0xABu8; BLOCK_SIZE * 3 + 17];
        partition.write_large(&pool, &payload).unwrap();
        assert_eq!(partition.element_count(), 1);
        partition.release_blocks(&pool);
    }
}
