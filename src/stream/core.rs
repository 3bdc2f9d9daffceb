//! Shared plumbing behind both stream flavors: a partition array backed by
//! the block pool, plus the `is_created` flag that goes false the instant
//! `dispose` is scheduled even though physical release is deferred (§3
//! "Lifecycle").

use crate::block_pool::BlockPool;
use crate::plain::PlainData;
use crate::stream::partition::Partition;
use crate::sync::{AtomicBool, Arc, Ordering};
use std::cell::UnsafeCell;
use std::marker::PhantomData;

pub(crate) struct StreamCore<T: PlainData> {
    pub(crate) pool: Arc<BlockPool>,
    partitions: Box<[UnsafeCell<Partition>]>,
    is_created: AtomicBool,
    _marker: PhantomData<T>,
}

// SAFETY: each partition slot is written by at most one thread during the
// write phase (the thread that owns that partition index) and is read-only
// thereafter; callers never alias a slot across two live `&mut Partition`s.
unsafe impl<T: PlainData> Sync for StreamCore<T> {}
unsafe impl<T: PlainData> Send for StreamCore<T> {}

impl<T: PlainData> StreamCore<T> {
    pub(crate) fn new(pool: Arc<BlockPool>, partition_count: usize) -> Self {
        let partitions = (0..partition_count)
            .map(|_| UnsafeCell::new(Partition::default()))
            .collect();
        Self {
            pool,
            partitions,
            is_created: AtomicBool::new(true),
            _marker: PhantomData,
        }
    }

    pub(crate) fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// # Safety
    /// The caller must be the single thread/task that owns `index` for the
    /// duration of the write phase.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn partition_mut(&self, index: usize) -> &mut Partition {
        &mut *self.partitions[index].get()
    }

    pub(crate) fn partition_ref(&self, index: usize) -> &Partition {
        // SAFETY: read phase only starts once the write phase has ended for
        // every partition (enforced by the EventRegistry rendezvous), so a
        // shared reference here never aliases a live `&mut`.
        unsafe { &*self.partitions[index].get() }
    }

    pub(crate) fn total_item_count(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| unsafe { &*p.get() }.element_count())
            .sum()
    }

    pub(crate) fn is_created(&self) -> bool {
        self.is_created.load(Ordering::Acquire)
    }

    pub(crate) fn mark_disposed(&self) {
        self.is_created.store(false, Ordering::Release);
    }

    /// Releases every partition's blocks back to the pool. Only valid once
    /// no reader or writer can still observe this stream.
    pub(crate) fn release_all(&self) {
        for slot in self.partitions.iter() {
            unsafe { &mut *slot.get() }.release_blocks(&self.pool);
        }
    }
}
