//! Block-pool-backed append-only stream container (§3, §4.2-§4.3): two
//! partitioning flavors, [`ThreadStream`] and [`IndexStream`], sharing one
//! block layout, one [`Reader`](reader::Reader) contract, and zero-copy
//! reads.

pub(crate) mod core;
pub mod index_stream;
pub mod partition;
pub mod reader;
pub mod thread_stream;

pub use index_stream::{IndexStream, IndexWriter};
pub use reader::{Reader, StreamReader};
pub use thread_stream::{ThreadStream, ThreadWriter};

use crate::handle::TaskHandle;
use crate::plain::PlainData;
use crate::sync::Arc;

/// Type-erased handle to either stream flavor, as stored inside an
/// `EventRegistry` (§3 "EventRegistry<E>": `active_writers: list<Stream>`).
/// Kept as a closed two-variant enum rather than a trait object — per
/// Design Note "Two stream flavors": Readers must not branch on flavor, but
/// the registry bookkeeping legitimately does, since only the writer side
/// differs between them.
pub(crate) enum AnyStream<T: PlainData> {
    Thread(Arc<ThreadStream<T>>),
    Index(Arc<IndexStream<T>>),
}

impl<T: PlainData> Clone for AnyStream<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Thread(s) => Self::Thread(s.clone()),
            Self::Index(s) => Self::Index(s.clone()),
        }
    }
}

impl<T: PlainData> AnyStream<T> {
    pub(crate) fn partition_count(&self) -> usize {
        match self {
            Self::Thread(s) => s.partition_count(),
            Self::Index(s) => s.partition_count(),
        }
    }

    pub(crate) fn total_item_count(&self) -> usize {
        match self {
            Self::Thread(s) => s.total_item_count(),
            Self::Index(s) => s.total_item_count(),
        }
    }

    pub(crate) fn is_created(&self) -> bool {
        match self {
            Self::Thread(s) => s.is_created(),
            Self::Index(s) => s.is_created(),
        }
    }

    pub(crate) fn reader(&self) -> Reader<T> {
        match self {
            Self::Thread(s) => s.reader(),
            Self::Index(s) => s.reader(),
        }
    }

    /// Schedules disposal: marks the stream destroyed immediately and
    /// releases its blocks once `handle` is observed complete. The core has
    /// no asynchronous executor of its own, so "scheduling" here means the
    /// caller (`EventRegistry::update`) is responsible for calling this only
    /// after it has already waited on `handle` — matching §3's guarantee
    /// that "no reader started afterward observes freed memory" without
    /// requiring a real task-graph dependency to enforce it internally.
    pub(crate) fn dispose(&self, handle: &dyn TaskHandle) {
        match self {
            Self::Thread(s) => s.mark_disposed(),
            Self::Index(s) => s.mark_disposed(),
        }
        handle.wait();
        match self {
            Self::Thread(s) => s.release_blocks(),
            Self::Index(s) => s.release_blocks(),
        }
    }
}
