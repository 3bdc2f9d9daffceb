//! Process-wide pool of fixed-size memory blocks backing every [`Stream`](crate::stream)
//! payload (§4.1).
//!
//! The fast path is a Treiber stack: free blocks are intrusively linked
//! through their own `next` pointer, so `acquire`/`release` never touch the
//! system allocator once the pool has been warmed up. `rc_event_queue` plays
//! the same trick for its chunk free-list under the `double_buffering`
//! feature; we make it the only path rather than an opt-in feature, since
//! every `Stream` here is short-lived and pool reuse is the point.

use crate::error::{EventBusError, Result};
use crate::sync::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Payload capacity of a single block, in bytes. Compile-time constant per
/// §6 ("Block size = 4096 bytes").
pub const BLOCK_SIZE: usize = 4096;

/// A fixed-size byte buffer with a forward link to the next block in the
/// same partition. While free, the same `next` field threads the pool's
/// internal free list — a block is never observed by two partitions (or by
/// a partition and the free list) at the same time, so reusing the field is
/// safe.
#[repr(C)]
pub(crate) struct Block {
    data: [u8; BLOCK_SIZE],
    next: AtomicPtr<Block>,
}

impl Block {
    #[inline]
    pub(crate) fn data_ptr(&self) -> *mut u8 {
        self.data.as_ptr() as *mut u8
    }

    #[inline]
    pub(crate) fn next(&self) -> &AtomicPtr<Block> {
        &self.next
    }
}

/// Host-supplied configuration for a [`BlockPool`] (§6 "Configuration
/// enumerated"). Constructed by the host and handed to `BlockPool::new` —
/// never read from ambient/global state (see Design Note "Block pool as
/// process-wide state").
#[derive(Debug, Clone, Copy)]
pub struct BlockPoolConfig {
    /// Upper bound on partitions a `ThreadStream` may request; consumed by
    /// `ThreadStream` construction, not by the pool itself, but carried here
    /// since it is the scheduler property the whole bus is built against.
    pub max_threads: usize,
    /// When `true`, the pool survives scheduling boundaries (ticks); when
    /// `false`, `drain` is expected to run at each tick boundary. Required
    /// when multiple `EventSystem`s run at different tick rates, to avoid
    /// premature block reuse across a slower consumer.
    pub persistent: bool,
}

impl Default for BlockPoolConfig {
    fn default() -> Self {
        Self {
            max_threads: 64,
            persistent: true,
        }
    }
}

/// Thread-safe, wait-free-on-the-fast-path pool of [`BLOCK_SIZE`] blocks.
pub struct BlockPool {
    free_list: AtomicPtr<Block>,
    config: BlockPoolConfig,
    allocated: AtomicUsize,
    pooled: AtomicUsize,
}

unsafe impl Send for BlockPool {}
unsafe impl Sync for BlockPool {}

impl BlockPool {
    pub fn new(config: BlockPoolConfig) -> Self {
        Self {
            free_list: AtomicPtr::new(std::ptr::null_mut()),
            config,
            allocated: AtomicUsize::new(0),
            pooled: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &BlockPoolConfig {
        &self.config
    }

    /// Total blocks currently carved out of the system allocator (free or in use).
    pub fn allocated_count(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Blocks currently sitting in the free list.
    pub fn pooled_count(&self) -> usize {
        self.pooled.load(Ordering::Relaxed)
    }

    /// Pops a block from the free list, falling back to the system allocator
    /// when the pool is empty. O(1) amortized; the fast path never blocks.
    pub(crate) fn acquire(&self) -> Result<NonNull<Block>> {
        loop {
            let head = self.free_list.load(Ordering::Acquire);
            if head.is_null() {
                return self.allocate_new();
            }

            let next = unsafe { (*head).next.load(Ordering::Relaxed) };
            if self
                .free_list
                .compare_exchange_weak(head, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                self.pooled.fetch_sub(1, Ordering::Relaxed);
                // SAFETY: `head` came from a non-null, previously-constructed Block.
                return Ok(unsafe { NonNull::new_unchecked(head) });
            }
        }
    }

    fn allocate_new(&self) -> Result<NonNull<Block>> {
        tracing::trace!("block pool empty, falling back to the system allocator");

        let layout = Layout::new::<Block>();
        // SAFETY: layout is non-zero-sized and well-formed for `Block`.
        let ptr = unsafe { alloc_zeroed(layout) } as *mut Block;
        let Some(non_null) = NonNull::new(ptr) else {
            return Err(EventBusError::AllocatorExhausted);
        };

        // `alloc_zeroed` already zero-initialized `data`; the `next` pointer
        // just needs its atomic discriminant written so later atomic ops are
        // well-defined.
        unsafe {
            std::ptr::write(std::ptr::addr_of_mut!((*ptr).next), AtomicPtr::new(std::ptr::null_mut()));
        }

        self.allocated.fetch_add(1, Ordering::Relaxed);
        Ok(non_null)
    }

    /// Pushes a block back onto the free list. Never fails.
    pub(crate) fn release(&self, block: NonNull<Block>) {
        loop {
            let head = self.free_list.load(Ordering::Relaxed);
            unsafe {
                block.as_ref().next.store(head, Ordering::Relaxed);
            }
            if self
                .free_list
                .compare_exchange_weak(head, block.as_ptr(), Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                self.pooled.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    /// Frees every pooled block's underlying memory. Called at process
    /// teardown (or at a tick boundary when [`BlockPoolConfig::persistent`]
    /// is `false`); never called while any `Stream` might still hand out
    /// blocks it expects to reuse.
    pub fn drain(&self) {
        let layout = Layout::new::<Block>();
        loop {
            let head = self.free_list.load(Ordering::Acquire);
            if head.is_null() {
                break;
            }
            let next = unsafe { (*head).next.load(Ordering::Relaxed) };
            if self
                .free_list
                .compare_exchange_weak(head, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                self.pooled.fetch_sub(1, Ordering::Relaxed);
                self.allocated.fetch_sub(1, Ordering::Relaxed);
                unsafe {
                    dealloc(head as *mut u8, layout);
                }
            }
        }
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        self.drain();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acquire_then_release_reuses_block() {
        let pool = BlockPool::new(BlockPoolConfig::default());
        let a = pool.acquire().unwrap();
        assert_eq!(pool.allocated_count(), 1);
        pool.release(a);
        assert_eq!(pool.pooled_count(), 1);

        let b = pool.acquire().unwrap();
        assert_eq!(a, b, "released block should be reused rather than reallocated");
        assert_eq!(pool.allocated_count(), 1);
        pool.release(b);
    }

    #[test]
    fn acquire_beyond_pool_allocates_fresh_blocks() {
        let pool = BlockPool::new(BlockPoolConfig::default());
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.allocated_count(), 2);
        pool.release(a);
        pool.release(b);
    }

    #[test]
    fn concurrent_acquire_release_never_double_hands_out_a_block() {
        use std::collections::HashSet;
        use std::sync::Mutex as StdMutex;

        let pool = BlockPool::new(BlockPoolConfig::default());
        let seen = StdMutex::new(HashSet::new());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        let b = pool.acquire().unwrap();
                        {
                            let mut seen = seen.lock().unwrap();
                            assert!(seen.insert(b), "block handed out to two owners at once");
                        }
                        {
                            let mut seen = seen.lock().unwrap();
                            seen.remove(&b);
                        }
                        pool.release(b);
                    }
                });
            }
        });
    }
}
