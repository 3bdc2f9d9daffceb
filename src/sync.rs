//! Centralizes the synchronization primitives used across the crate so the
//! rest of the code never reaches for `std::sync` or `spin`/`lock_api`
//! directly. Swapping the raw lock strategy (e.g. for a `loom`-checked
//! build) means touching this module alone.

pub(crate) use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicUsize, Ordering};
pub(crate) use std::sync::Arc;

/// Very short, contention-free critical sections (mode-bus lookup, the
/// per-reader start-position snapshot) use the bare spinlock directly: no
/// blocking syscalls, no fairness needed.
pub(crate) use spin::mutex::{SpinMutex, SpinMutexGuard};

/// Longer-held critical sections (registry bookkeeping across an entire
/// rendezvous call) go through [`lock_api`] over a hand-rolled raw spinlock,
/// so the raw lock strategy can be swapped (e.g. to a parking, fairness-aware
/// lock) without touching call sites.
pub(crate) type Mutex<T> = lock_api::Mutex<RawSpinLock, T>;
pub(crate) type MutexGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

pub(crate) struct RawSpinLock(AtomicBool);

unsafe impl lock_api::RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock(AtomicBool::new(false));

    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {
        while self
            .0
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.0.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }
}
