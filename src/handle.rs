//! The host task scheduler contract (§1: "we specify only its required
//! contract"). A *task handle* is an opaque completion token the host
//! scheduler hands back when it dispatches work; the bus only ever needs to
//! merge handles ("dominates") and, at `EventSystem::update`, wait on the
//! merged result (§4.4 step 1, §5 "Suspension").
//!
//! The bus ships a trivial [`NullHandle`] (the `⊥` used throughout §8's
//! literal scenarios) so it is fully testable without a real scheduler.

use crate::sync::Arc;

/// Contract a host scheduler's completion token must satisfy.
///
/// A real host implements this over its own job-graph fence; the bus never
/// constructs task handles itself, only merges and waits on them.
pub trait TaskHandle: Send + Sync {
    /// Blocks the calling thread until the underlying task has completed.
    fn wait(&self);

    /// Non-blocking completion check.
    fn is_complete(&self) -> bool;
}

/// The always-already-complete handle, `⊥`: used when a producer or
/// consumer task has no real asynchronous work to depend on (e.g. in tests,
/// or when a task runs to completion inline before its handle is published).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHandle;

impl TaskHandle for NullHandle {
    fn wait(&self) {}

    fn is_complete(&self) -> bool {
        true
    }
}

impl TaskHandle for Arc<dyn TaskHandle> {
    fn wait(&self) {
        (**self).wait();
    }

    fn is_complete(&self) -> bool {
        (**self).is_complete()
    }
}

/// Merges zero or more task handles into one that "dominates" all of them:
/// it is complete only once every merged handle is complete. Used to
/// implement `pending_producer_handle`/`pending_consumer_handle` (§4.4) and
/// `acquire_readers`'s `dep ∧ pending_producer_handle` output handle.
#[derive(Clone, Default)]
pub struct CompletionSet {
    handles: Vec<Arc<dyn TaskHandle>>,
}

impl CompletionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `handle` into the set.
    pub fn merge(&mut self, handle: Arc<dyn TaskHandle>) {
        self.handles.push(handle);
    }

    /// Clears the set, returning the handles it held (used once the merged
    /// dependency has been consumed, e.g. after `update`'s wait step).
    pub fn take(&mut self) -> Vec<Arc<dyn TaskHandle>> {
        std::mem::take(&mut self.handles)
    }

    /// A standalone handle that waits for every handle currently in the set.
    pub fn as_handle(&self) -> Arc<dyn TaskHandle> {
        Arc::new(self.clone()) as Arc<dyn TaskHandle>
    }
}

impl TaskHandle for CompletionSet {
    fn wait(&self) {
        for handle in &self.handles {
            handle.wait();
        }
    }

    fn is_complete(&self) -> bool {
        self.handles.iter().all(|h| h.is_complete())
    }
}

/// Combines two already-erased handles into one that dominates both, used
/// for `dep ∧ pending_producer_handle` without needing to mutate either
/// side's `CompletionSet`.
pub fn combine(a: Arc<dyn TaskHandle>, b: Arc<dyn TaskHandle>) -> Arc<dyn TaskHandle> {
    let mut set = CompletionSet::new();
    set.merge(a);
    set.merge(b);
    set.as_handle()
}

/// The execution context a producer task receives when the host scheduler
/// dispatches it, per Design Note "Thread index discovery": the `Writer`
/// carries no mutable per-thread state of its own and never consults a
/// global/thread-local convention — the worker's partition index always
/// arrives as an explicit, injected parameter.
pub trait TaskContext {
    /// The index of the partition this dispatch owns, in `[0, MaxThreads)`.
    fn thread_index(&self) -> usize;
}

/// A fixed-index `TaskContext`, primarily for single-threaded call sites and
/// tests: `StaticThreadContext(3)` always reports thread index `3`.
#[derive(Debug, Clone, Copy)]
pub struct StaticThreadContext(pub usize);

impl TaskContext for StaticThreadContext {
    fn thread_index(&self) -> usize {
        self.0
    }
}
