//! Per-event-type rendezvous table (§4.4 "EventRegistry<E>"): one instance
//! lives behind a `TypeId` lookup in `EventSystem` for every `E` a host has
//! ever touched. The table enforces the writer/reader pairing protocol and
//! drives disposal/deferral at `update()`.

use crate::block_pool::BlockPool;
use crate::error::{EventBusError, Result};
use crate::event_system::mode::ModeBus;
use crate::handle::{combine, CompletionSet, TaskHandle};
use crate::plain::PlainData;
use crate::stream::{AnyStream, IndexStream, IndexWriter, Reader, ThreadStream, ThreadWriter};
use crate::sync::Arc;
use std::any::TypeId;
use std::marker::PhantomData;

/// One event type's writer/reader bookkeeping. Generic so that downcasting
/// out of `EventSystem`'s `TypeId`-keyed map recovers a concretely typed
/// table rather than a type-erased one.
pub(crate) struct EventRegistry<E: PlainData> {
    /// Streams created (and possibly already published) this tick that have
    /// not yet been swept into an `acquire_readers` call.
    active_writers: Vec<AnyStream<E>>,
    /// The exact set of streams handed out by the most recent
    /// `acquire_readers` call, held until its consumer handle is published —
    /// at that point they are read and eligible for disposal at `update`.
    acquired_batch: Vec<AnyStream<E>>,
    pending_producer_handle: CompletionSet,
    pending_consumer_handle: CompletionSet,
    writer_open: bool,
    reader_open: bool,
    _marker: PhantomData<E>,
}

impl<E: PlainData> Default for EventRegistry<E> {
    fn default() -> Self {
        Self {
            active_writers: Vec::new(),
            acquired_batch: Vec::new(),
            pending_producer_handle: CompletionSet::new(),
            pending_consumer_handle: CompletionSet::new(),
            writer_open: false,
            reader_open: false,
            _marker: PhantomData,
        }
    }
}

impl<E: PlainData> EventRegistry<E> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `create_writer::<E>()` (§4.4): a thread-indexed writer over a fresh
    /// `ThreadStream`.
    pub(crate) fn create_writer(&mut self, pool: &Arc<BlockPool>, max_threads: usize) -> Result<ThreadWriter<E>> {
        self.guard_writer_creation()?;
        let stream = Arc::new(ThreadStream::<E>::new(pool.clone(), max_threads)?);
        let writer = stream.writer();
        self.active_writers.push(AnyStream::Thread(stream));
        self.writer_open = true;
        Ok(writer)
    }

    /// `create_writer::<E>(P)` (§4.4): a caller-indexed writer over a fresh
    /// `IndexStream` with `partition_count` partitions.
    pub(crate) fn create_indexed_writer(
        &mut self,
        pool: &Arc<BlockPool>,
        partition_count: usize,
    ) -> Result<IndexWriter<E>> {
        self.guard_writer_creation()?;
        let stream = Arc::new(IndexStream::<E>::new(pool.clone(), partition_count)?);
        let writer = stream.index_writer();
        self.active_writers.push(AnyStream::Index(stream));
        self.writer_open = true;
        Ok(writer)
    }

    fn guard_writer_creation(&self) -> Result<()> {
        if self.reader_open {
            tracing::error!("create_writer rejected: reader still open for this event type");
            return Err(EventBusError::WriterWhileReaderOpen);
        }
        if self.writer_open {
            tracing::error!("create_writer rejected: prior writer never published a producer handle");
            return Err(EventBusError::UnpairedWriter);
        }
        Ok(())
    }

    /// `add_producer_handle::<E>(h)` (§4.4): publishes the handle that
    /// dominates whatever task(s) just wrote through the writer returned by
    /// the last `create_writer` call, closing the writer-open window.
    pub(crate) fn add_producer_handle(&mut self, handle: Arc<dyn TaskHandle>) -> Result<()> {
        if !self.writer_open {
            tracing::error!("add_producer_handle rejected: no writer is currently open");
            return Err(EventBusError::NoWriterOpen);
        }
        self.pending_producer_handle.merge(handle);
        self.writer_open = false;
        Ok(())
    }

    /// `acquire_readers::<E>(dep)` (§4.4): sweeps every stream deferred from
    /// a previous tick (via the mode bus) plus everything created this tick
    /// into the batch being read, and returns one `Reader` per stream
    /// together with a handle dominating `dep` and every producer handle
    /// published since the last acquire.
    pub(crate) fn acquire_readers(
        &mut self,
        dep: Arc<dyn TaskHandle>,
        bus: &ModeBus,
        event_type: TypeId,
    ) -> Result<(Arc<dyn TaskHandle>, Vec<Reader<E>>)> {
        if self.writer_open {
            tracing::error!("acquire_readers rejected: writer still open for this event type");
            return Err(EventBusError::ReaderWhileWriterOpen);
        }
        if self.reader_open {
            tracing::error!("acquire_readers rejected: prior reader batch never published a consumer handle");
            return Err(EventBusError::UnpairedReader);
        }

        let mut deferred = bus.take_deferred::<E>(event_type);
        self.active_writers.append(&mut deferred);
        self.acquired_batch.append(&mut self.active_writers);

        let readers = self.acquired_batch.iter().map(AnyStream::reader).collect();
        let out_handle = combine(dep, self.pending_producer_handle.as_handle());
        self.reader_open = true;
        Ok((out_handle, readers))
    }

    /// `add_consumer_handle::<E>(h)` (§4.4): publishes the handle that
    /// dominates whatever task(s) just read through the readers returned by
    /// the last `acquire_readers` call, closing the reader-open window.
    pub(crate) fn add_consumer_handle(&mut self, handle: Arc<dyn TaskHandle>) -> Result<()> {
        if !self.reader_open {
            tracing::error!("add_consumer_handle rejected: no reader batch is currently open");
            return Err(EventBusError::NoReaderOpen);
        }
        self.pending_consumer_handle.merge(handle);
        self.reader_open = false;
        Ok(())
    }

    /// `has_readers::<E>()`: true iff some stream whose producer handle has
    /// already been published still holds unconsumed state — either this
    /// tick's active writers beyond the one still open, the batch awaiting
    /// disposal, or streams deferred on the bus from a previous tick.
    pub(crate) fn has_readers(&self, bus: &ModeBus, event_type: TypeId) -> bool {
        let published_active = if self.writer_open {
            self.active_writers.len().saturating_sub(1)
        } else {
            self.active_writers.len()
        };
        published_active > 0 || !self.acquired_batch.is_empty() || bus.deferred_count::<E>(event_type) > 0
    }

    /// `reader_count::<E>()`: cardinality of every stream this registry
    /// currently knows about, in any tracked state.
    pub(crate) fn reader_count(&self, bus: &ModeBus, event_type: TypeId) -> usize {
        self.active_writers.len() + self.acquired_batch.len() + bus.deferred_count::<E>(event_type)
    }

    /// The four-step end-of-tick protocol (§4.4):
    /// 1. Wait for every outstanding producer and consumer handle.
    /// 2. Dispose whatever was fully acquired (and thus fully read) this tick.
    /// 3. Defer whatever was created but never acquired, via the mode bus.
    /// 4. Reset tick-local pairing state.
    ///
    /// Returns the `(disposed, deferred)` stream counts, surfaced by
    /// `EventSystem::update` as one `debug!` span per event type per tick.
    pub(crate) fn update(&mut self, bus: &ModeBus, event_type: TypeId) -> (usize, usize) {
        let combined = combine(
            self.pending_producer_handle.as_handle(),
            self.pending_consumer_handle.as_handle(),
        );
        combined.wait();

        let disposed = self.acquired_batch.len();
        if !self.acquired_batch.is_empty() {
            let consumer_handle = self.pending_consumer_handle.as_handle();
            for stream in self.acquired_batch.drain(..) {
                stream.dispose(&*consumer_handle);
            }
        }

        let deferred = self.active_writers.len();
        if !self.active_writers.is_empty() {
            let taken = std::mem::take(&mut self.active_writers);
            bus.push_deferred::<E>(event_type, taken);
        }

        self.pending_producer_handle = CompletionSet::new();
        self.pending_consumer_handle = CompletionSet::new();

        (disposed, deferred)
    }
}
