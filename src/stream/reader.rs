//! Reader view shared by both stream flavors (§4.3). Readers are read-only
//! shared references: any number may be scheduled concurrently against the
//! same stream, and against distinct partitions of the same stream, without
//! coordination — this is also why `ThreadStream` and `IndexStream` return
//! the exact same `Reader<T>` type rather than two lookalike structs:
//! "Reader callers must not branch on flavor" (Design Note).

use crate::block_pool::{Block, BLOCK_SIZE};
use crate::error::{EventBusError, Result};
use crate::plain::PlainData;
use crate::stream::core::StreamCore;
use crate::stream::partition::Partition;
use crate::sync::{Arc, Ordering};
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

pub trait StreamReader {
    type Item: PlainData;

    fn partition_count(&self) -> usize;
    fn total_item_count(&self) -> usize;

    /// Seeks to partition `index`'s first block; returns its element count.
    fn begin_partition(&mut self, index: usize) -> Result<usize>;

    /// Requires every item to have been consumed; otherwise an incomplete-read error.
    fn end_partition(&mut self) -> Result<()>;

    fn read(&mut self) -> Result<Self::Item>;
    fn peek(&mut self) -> Result<Self::Item>;
    fn read_large(&mut self, out: &mut Vec<u8>) -> Result<()>;
}

#[derive(Clone, Copy)]
struct PartitionCursor {
    block: Option<NonNull<Block>>,
    offset: usize,
    consumed: usize,
    total: usize,
}

impl PartitionCursor {
    fn start(partition: &Partition) -> Self {
        Self {
            block: partition.first_block(),
            offset: 0,
            consumed: 0,
            total: partition.element_count(),
        }
    }

    fn remaining(&self) -> usize {
        self.total - self.consumed
    }

    fn locate<T>(&self) -> Result<(NonNull<Block>, usize)> {
        if self.remaining() == 0 {
            return Err(EventBusError::OverRead {
                consumed: self.consumed,
                total: self.total,
            });
        }
        let align = align_of::<T>().max(4);
        let size = size_of::<T>();
        let offset = align_up(self.offset, align);
        let block = self.block.ok_or(EventBusError::NoActivePartition)?;

        if offset + size > BLOCK_SIZE {
            let next = unsafe { block.as_ref().next().load(Ordering::Acquire) };
            let next = NonNull::new(next).expect(
                "writer guarantees a linked block exists for every unread item in the partition",
            );
            return Ok((next, 0));
        }
        Ok((block, offset))
    }

    fn read<T: PlainData>(&mut self) -> Result<T> {
        let (block, offset) = self.locate::<T>()?;
        let value = unsafe { (block.as_ref().data_ptr().add(offset) as *const T).read_unaligned() };
        self.block = Some(block);
        self.offset = offset + size_of::<T>();
        self.consumed += 1;
        Ok(value)
    }

    fn peek<T: PlainData>(&self) -> Result<T> {
        let mut clone = *self;
        clone.read::<T>()
    }

    fn read_raw_bytes(&mut self, len: usize, out: &mut Vec<u8>) -> Result<()> {
        let mut remaining = len;
        while remaining > 0 {
            let block = self.block.ok_or(EventBusError::NoActivePartition)?;
            let space = BLOCK_SIZE - self.offset;
            if space == 0 {
                let next = unsafe { block.as_ref().next().load(Ordering::Acquire) };
                self.block = NonNull::new(next);
                self.offset = 0;
                continue;
            }
            let take = space.min(remaining);
            unsafe {
                let src = block.as_ref().data_ptr().add(self.offset);
                out.extend_from_slice(std::slice::from_raw_parts(src, take));
            }
            self.offset += take;
            remaining -= take;
        }
        Ok(())
    }

    fn read_large(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.remaining() == 0 {
            return Err(EventBusError::OverRead {
                consumed: self.consumed,
                total: self.total,
            });
        }
        let mut len_bytes = Vec::with_capacity(4);
        self.read_raw_bytes(4, &mut len_bytes)?;
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        out.clear();
        self.read_raw_bytes(len, out)?;
        self.consumed += 1;
        Ok(())
    }
}

#[inline]
fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

/// The concrete reader view handed out by both `ThreadStream::reader()` and
/// `IndexStream::reader()`.
pub struct Reader<T: PlainData> {
    core: Arc<StreamCore<T>>,
    current_index: Option<usize>,
    cursor: Option<PartitionCursor>,
}

// SAFETY: a `Reader` only ever walks partitions that are frozen for the
// duration of consumption (§5 "during consumption, no writer runs"); the raw
// `NonNull<Block>` cursor it carries is exclusively owned by this Reader
// value, never aliased by another Reader across the same bytes concurrently
// with a write, so moving or sharing it across threads is safe.
unsafe impl<T: PlainData> Send for Reader<T> {}
unsafe impl<T: PlainData> Sync for Reader<T> {}

impl<T: PlainData> Reader<T> {
    pub(crate) fn new(core: Arc<StreamCore<T>>) -> Self {
        Self {
            core,
            current_index: None,
            cursor: None,
        }
    }
}

/// Readers are read-only shared references over the same stream (module doc
/// above): cloning one yields an independent cursor, free to be handed to its
/// own partition or its own task, over the same underlying blocks.
impl<T: PlainData> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self::new(self.core.clone())
    }
}

impl<T: PlainData> StreamReader for Reader<T> {
    type Item = T;

    fn partition_count(&self) -> usize {
        self.core.partition_count()
    }

    fn total_item_count(&self) -> usize {
        self.core.total_item_count()
    }

    fn begin_partition(&mut self, index: usize) -> Result<usize> {
        let count = self.core.partition_count();
        if index >= count {
            return Err(EventBusError::PartitionIndexOutOfRange {
                index: index as isize,
                count,
            });
        }
        let partition = self.core.partition_ref(index);
        let cursor = PartitionCursor::start(partition);
        let total = cursor.total;
        self.current_index = Some(index);
        self.cursor = Some(cursor);
        Ok(total)
    }

    fn end_partition(&mut self) -> Result<()> {
        let cursor = self.cursor.take().ok_or(EventBusError::NoActivePartition)?;
        self.current_index = None;
        if cursor.remaining() != 0 {
            return Err(EventBusError::IncompletePartitionRead {
                remaining: cursor.remaining(),
                total: cursor.total,
            });
        }
        Ok(())
    }

    fn read(&mut self) -> Result<T> {
        self.cursor
            .as_mut()
            .ok_or(EventBusError::NoActivePartition)?
            .read::<T>()
    }

    fn peek(&mut self) -> Result<T> {
        self.cursor
            .as_ref()
            .ok_or(EventBusError::NoActivePartition)?
            .peek::<T>()
    }

    fn read_large(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.cursor
            .as_mut()
            .ok_or(EventBusError::NoActivePartition)?
            .read_large(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_pool::{BlockPool, BlockPoolConfig};
    use crate::handle::StaticThreadContext;
    use crate::stream::thread_stream::ThreadStream;

    #[test]
    fn read_before_begin_partition_fails_with_shape_error() {
        let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
        let stream = ThreadStream::<u32>::new(pool, 1).unwrap();
        let mut reader = stream.reader();

        assert_eq!(reader.read().unwrap_err(), EventBusError::NoActivePartition);
    }

    #[test]
    fn reading_past_partition_end_fails_with_shape_error() {
        let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
        let stream = ThreadStream::<u32>::new(pool, 1).unwrap();
        let writer = stream.writer();
        writer.write(&StaticThreadContext(0), 1u32).unwrap();

        let mut reader = stream.reader();
        assert_eq!(reader.begin_partition(0).unwrap(), 1);
        assert_eq!(reader.read().unwrap(), 1u32);

        let err = reader.read().unwrap_err();
        assert_eq!(err, EventBusError::OverRead { consumed: 1, total: 1 });
    }
}
