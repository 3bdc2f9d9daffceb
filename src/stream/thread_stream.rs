//! Thread-indexed stream (§3 "ThreadStream"): partition key is the
//! executing thread's index, discovered at write time through an injected
//! [`TaskContext`](crate::handle::TaskContext), never through ambient
//! thread-local state (Design Note "Thread index discovery").

use crate::block_pool::BlockPool;
use crate::error::{EventBusError, Result};
use crate::handle::TaskContext;
use crate::plain::PlainData;
use crate::stream::core::StreamCore;
use crate::stream::reader::Reader;
use crate::sync::Arc;
use std::cell::Cell;

/// A stream whose `P` partitions are indexed `0..MaxThreads`.
pub struct ThreadStream<T: PlainData> {
    core: Arc<StreamCore<T>>,
}

impl<T: PlainData> ThreadStream<T> {
    /// Allocates a fresh stream with `max_threads` partitions, backed by
    /// `pool`. Most callers reach `ThreadStream`s indirectly through
    /// `EventSystem::create_writer`, but the type is directly constructible
    /// for standalone use and testing.
    ///
    /// `max_threads` must not exceed `pool`'s configured
    /// [`BlockPoolConfig::max_threads`](crate::block_pool::BlockPoolConfig::max_threads)
    /// (§7 Capacity: "requested P exceeds MaxThreads for ThreadStream").
    pub fn new(pool: Arc<BlockPool>, max_threads: usize) -> Result<Self> {
        let configured_max = pool.config().max_threads;
        if max_threads > configured_max {
            return Err(EventBusError::TooManyThreads {
                requested: max_threads,
                max: configured_max,
            });
        }
        Ok(Self {
            core: Arc::new(StreamCore::new(pool, max_threads)),
        })
    }

    pub fn partition_count(&self) -> usize {
        self.core.partition_count()
    }

    pub fn total_item_count(&self) -> usize {
        self.core.total_item_count()
    }

    pub fn is_created(&self) -> bool {
        self.core.is_created()
    }

    /// Marks the stream destroyed; physical block release happens once
    /// `handle` completes (§3 "Lifecycle").
    pub fn mark_disposed(&self) {
        self.core.mark_disposed();
    }

    pub(crate) fn release_blocks(&self) {
        self.core.release_all();
    }

    pub fn writer(&self) -> ThreadWriter<T> {
        ThreadWriter {
            core: self.core.clone(),
            used: Cell::new(false),
        }
    }

    pub fn reader(&self) -> Reader<T> {
        Reader::new(self.core.clone())
    }
}

/// Writer view over a [`ThreadStream`]. Zero-sized beyond the stream
/// reference: each write discovers its partition from the `TaskContext`
/// passed in, so duplicating a not-yet-used `ThreadWriter` by value (e.g.
/// handing a copy to each of several producer tasks before any of them has
/// written) is always safe. Duplicating an *already-used* copy is the
/// hazard the source guarded with a one-shot sentinel (§4.2); here, `Clone`
/// itself is the checked operation — see the `Clone` impl below.
pub struct ThreadWriter<T: PlainData> {
    core: Arc<StreamCore<T>>,
    used: Cell<bool>,
}

unsafe impl<T: PlainData> Send for ThreadWriter<T> {}

impl<T: PlainData> Clone for ThreadWriter<T> {
    fn clone(&self) -> Self {
        debug_assert!(
            !self.used.get(),
            "ThreadWriter duplicated by value after a write on the original — \
             distribute writer copies to producer tasks before any of them write"
        );
        Self {
            core: self.core.clone(),
            used: Cell::new(false),
        }
    }
}

impl<T: PlainData> ThreadWriter<T> {
    /// Appends `value` into the partition owned by `ctx.thread_index()`.
    pub fn write(&self, ctx: &dyn TaskContext, value: T) -> Result<()> {
        let index = ctx.thread_index();
        let count = self.core.partition_count();
        if index >= count {
            return Err(EventBusError::TooManyThreads {
                requested: index + 1,
                max: count,
            });
        }
        // SAFETY: this partition index is owned exclusively by the calling
        // thread for the duration of the write phase (§5).
        let partition = unsafe { self.core.partition_mut(index) };
        partition.write(&self.core.pool, value)?;
        self.used.set(true);
        Ok(())
    }

    /// Writes a length-prefixed chunk that may span multiple blocks.
    pub fn write_large(&self, ctx: &dyn TaskContext, bytes: &[u8]) -> Result<()> {
        let index = ctx.thread_index();
        let count = self.core.partition_count();
        if index >= count {
            return Err(EventBusError::TooManyThreads {
                requested: index + 1,
                max: count,
            });
        }
        let partition = unsafe { self.core.partition_mut(index) };
        partition.write_large(&self.core.pool, bytes)?;
        self.used.set(true);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_pool::BlockPoolConfig;
    use crate::handle::StaticThreadContext;
    use crate::stream::reader::StreamReader;

    #[test]
    fn writer_observes_exactly_its_own_thread_partition() {
        let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
        let stream = ThreadStream::<u32>::new(pool, 4).unwrap();
        let writer = stream.writer();

        writer.write(&StaticThreadContext(0), 10).unwrap();
        writer.write(&StaticThreadContext(2), 20).unwrap();
        writer.write(&StaticThreadContext(2), 21).unwrap();

        let mut reader = stream.reader();
        assert_eq!(reader.begin_partition(0).unwrap(), 1);
        assert_eq!(reader.read().unwrap(), 10u32);
        reader.end_partition().unwrap();

        assert_eq!(reader.begin_partition(1).unwrap(), 0);
        reader.end_partition().unwrap();

        assert_eq!(reader.begin_partition(2).unwrap(), 2);
        assert_eq!(reader.read().unwrap(), 20u32);
        assert_eq!(reader.read().unwrap(), 21u32);
        reader.end_partition().unwrap();
    }

    #[test]
    fn parallel_fan_out_sums_to_triangular_number() {
        let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
        const P: usize = 8;
        let stream = ThreadStream::<u32>::new(pool, P).unwrap();
        let writer = stream.writer();

        std::thread::scope(|scope| {
            for i in 0..P {
                let writer = writer.clone();
                scope.spawn(move || {
                    let ctx = StaticThreadContext(i);
                    for item in 0..i as u32 {
                        writer.write(&ctx, item).unwrap();
                    }
                });
            }
        });

        let expected: usize = (0..P).sum();
        assert_eq!(stream.total_item_count(), expected);
    }
}
