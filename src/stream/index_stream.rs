//! Caller-indexed stream (§3 "IndexStream"): partition key is supplied by
//! the caller via `begin_partition(i)`, allowing deterministic placement
//! (e.g. one partition per chunk of a parallel-for rather than per thread).

use crate::block_pool::BlockPool;
use crate::error::{EventBusError, Result};
use crate::plain::PlainData;
use crate::stream::core::StreamCore;
use crate::stream::reader::Reader;
use crate::sync::{AtomicBool, Arc, Ordering};
use std::cell::Cell;

pub struct IndexStream<T: PlainData> {
    core: Arc<StreamCore<T>>,
    /// Tracks, per index, whether `begin_partition` has ever been called —
    /// shared across every `IndexWriter` clone, since distinct parallel
    /// workers each open disjoint indices on the same stream.
    opened: Arc<[AtomicBool]>,
}

impl<T: PlainData> IndexStream<T> {
    /// Allocates a fresh stream with `partition_count` caller-indexed
    /// partitions. Most callers reach `IndexStream`s indirectly through
    /// `EventSystem::create_indexed_writer`, but the type is directly
    /// constructible for standalone use and testing.
    pub fn new(pool: Arc<BlockPool>, partition_count: usize) -> Result<Self> {
        if partition_count == 0 {
            return Err(EventBusError::NonPositiveCount { value: 0 });
        }
        let opened: Arc<[AtomicBool]> = (0..partition_count).map(|_| AtomicBool::new(false)).collect();
        Ok(Self {
            core: Arc::new(StreamCore::new(pool, partition_count)),
            opened,
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

    pub fn mark_disposed(&self) {
        self.core.mark_disposed();
    }

    pub(crate) fn release_blocks(&self) {
        self.core.release_all();
    }

    pub fn index_writer(&self) -> IndexWriter<T> {
        IndexWriter {
            core: self.core.clone(),
            opened: self.opened.clone(),
            state: Cell::new(WriterState::Idle),
            used: Cell::new(false),
        }
    }

    pub fn reader(&self) -> Reader<T> {
        Reader::new(self.core.clone())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    Open(usize),
}

/// Writer view over an [`IndexStream`]: a small `Idle -> Open(i) -> Idle`
/// state machine (§4.2). Clonable for the same reason `ThreadWriter` is —
/// distinct parallel workers each take their own clone and open disjoint
/// indices — but cloning a clone that has already opened a partition is the
/// same "duplicated by value after first write" hazard, checked the same
/// way.
pub struct IndexWriter<T: PlainData> {
    core: Arc<StreamCore<T>>,
    opened: Arc<[AtomicBool]>,
    state: Cell<WriterState>,
    used: Cell<bool>,
}

unsafe impl<T: PlainData> Send for IndexWriter<T> {}

impl<T: PlainData> Clone for IndexWriter<T> {
    fn clone(&self) -> Self {
        debug_assert!(
            !self.used.get(),
            "IndexWriter duplicated by value after a write on the original"
        );
        debug_assert!(
            self.state.get() == WriterState::Idle,
            "IndexWriter duplicated while a partition is still open"
        );
        Self {
            core: self.core.clone(),
            opened: self.opened.clone(),
            state: Cell::new(WriterState::Idle),
            used: Cell::new(false),
        }
    }
}

impl<T: PlainData> IndexWriter<T> {
    /// Opens partition `index`. `index` must be in range and must never
    /// have been opened before on this stream (canonical form: requires an
    /// explicit matching `end_partition` before the next `begin_partition`).
    pub fn begin_partition(&self, index: usize) -> Result<()> {
        if let WriterState::Open(open) = self.state.get() {
            return Err(EventBusError::PartitionAlreadyOpen { index: open });
        }
        self.open_index(index)
    }

    /// Non-canonical elided form: opening another partition implicitly
    /// closes the previous one instead of erroring (§9 Open Question,
    /// resolved in DESIGN.md).
    pub fn begin_partition_implicit_close(&self, index: usize) -> Result<()> {
        if let WriterState::Open(_) = self.state.get() {
            self.state.set(WriterState::Idle);
        }
        self.open_index(index)
    }

    fn open_index(&self, index: usize) -> Result<()> {
        let count = self.core.partition_count();
        if index >= count {
            return Err(EventBusError::PartitionIndexOutOfRange {
                index: index as isize,
                count,
            });
        }
        if self.opened[index].swap(true, Ordering::AcqRel) {
            return Err(EventBusError::PartitionReopened { index });
        }
        self.state.set(WriterState::Open(index));
        Ok(())
    }

    /// Appends `value` to the currently open partition.
    pub fn write(&self, value: T) -> Result<()> {
        let WriterState::Open(index) = self.state.get() else {
            return Err(EventBusError::NoOpenPartition);
        };
        // SAFETY: `index` was claimed exclusively by `open_index`'s
        // compare-and-swap on `opened`; no other writer can hold it.
        let partition = unsafe { self.core.partition_mut(index) };
        partition.write(&self.core.pool, value)?;
        self.used.set(true);
        Ok(())
    }

    pub fn write_large(&self, bytes: &[u8]) -> Result<()> {
        let WriterState::Open(index) = self.state.get() else {
            return Err(EventBusError::NoOpenPartition);
        };
        let partition = unsafe { self.core.partition_mut(index) };
        partition.write_large(&self.core.pool, bytes)?;
        self.used.set(true);
        Ok(())
    }

    /// Closes the currently open partition. An empty partition (opened then
    /// immediately closed) is legal — its reader will observe zero items.
    pub fn end_partition(&self) -> Result<()> {
        match self.state.get() {
            WriterState::Idle => Err(EventBusError::NoOpenPartition),
            WriterState::Open(_) => {
                self.state.set(WriterState::Idle);
                Ok(())
            }
        }
    }
}
