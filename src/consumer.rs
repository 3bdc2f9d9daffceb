//! Consumer task adaptors (§4.5): thin wrappers over the Reader set
//! `EventSystem::acquire_readers` returns. Each shape is offered in a serial
//! form (walked inline, on the calling thread) and a parallel fan-out form
//! (one task per unit of work, dispatched through a host-supplied
//! [`TaskDispatcher`]) — "both are contractually equivalent in *set of
//! observed events* but not in *order*."
//!
//! Every adaptor publishes a consumer handle that dominates the last task it
//! scheduled before returning, so the owning `EventSystem` can observe
//! completion at `update()` (§4.5 "Scheduling contract").

use crate::handle::{CompletionSet, NullHandle, TaskHandle};
use crate::plain::PlainData;
use crate::stream::{Reader, StreamReader};
use crate::sync::Arc;

/// The host scheduler's dispatch entry point, as seen by a consumer adaptor:
/// hand it a unit of work, get back a handle to its completion. A real host
/// implements this over its own job graph; adaptors never run tasks
/// themselves beyond the serial forms, which execute inline and report
/// already-complete.
pub trait TaskDispatcher {
    fn dispatch(&self, task: Box<dyn FnOnce() + Send>) -> Arc<dyn TaskHandle>;
}

fn drain_partition<E: PlainData>(reader: &mut Reader<E>, index: usize, mut f: impl FnMut(E)) {
    let count = reader
        .begin_partition(index)
        .expect("adaptor only visits partitions within range of its own reader");
    for _ in 0..count {
        let item = reader.read().expect("count came from begin_partition on the same partition");
        f(item);
    }
    reader
        .end_partition()
        .expect("every item returned by begin_partition's count was read above");
}

/// Per-event (§4.5 #1), serial form: visits every partition of every reader,
/// one reader at a time, on the calling thread. Already complete by the time
/// it returns.
pub fn for_each_event_serial<E: PlainData>(readers: &mut [Reader<E>], mut f: impl FnMut(E)) -> Arc<dyn TaskHandle> {
    for reader in readers.iter_mut() {
        let partitions = reader.partition_count();
        for index in 0..partitions {
            drain_partition(reader, index, &mut f);
        }
    }
    Arc::new(NullHandle)
}

/// Per-event (§4.5 #1), parallel fan-out form: dispatches one task per
/// reader, each scanning all of its own partitions; the returned handle
/// dominates every dispatched task.
pub fn for_each_event_parallel<E: PlainData>(
    dispatcher: &dyn TaskDispatcher,
    readers: Vec<Reader<E>>,
    f: impl Fn(E) + Send + Sync + Clone + 'static,
) -> Arc<dyn TaskHandle> {
    let mut completion = CompletionSet::new();
    for mut reader in readers {
        let f = f.clone();
        let handle = dispatcher.dispatch(Box::new(move || {
            let partitions = reader.partition_count();
            for index in 0..partitions {
                drain_partition(&mut reader, index, |item| f(item));
            }
        }));
        completion.merge(handle);
    }
    completion.as_handle()
}

/// Per-partition (§4.5 #2), serial form: invokes `f` once per `(reader,
/// partition_index)` pair, leaving the walk inside the partition — and the
/// matching `end_partition` call — to `f`.
pub fn for_each_partition_serial<E: PlainData>(
    readers: &mut [Reader<E>],
    mut f: impl FnMut(&mut Reader<E>, usize),
) -> Arc<dyn TaskHandle> {
    for (reader_index, reader) in readers.iter_mut().enumerate() {
        let partitions = reader.partition_count();
        for partition_index in 0..partitions {
            reader
                .begin_partition(partition_index)
                .unwrap_or_else(|e| panic!("reader {reader_index} partition {partition_index}: {e}"));
            f(reader, partition_index);
        }
    }
    Arc::new(NullHandle)
}

/// Per-partition (§4.5 #2), parallel fan-out form: dispatches one task per
/// `(reader, partition_index)` pair, each over its own `Reader` clone (module
/// doc on `Reader`: distinct partitions of the same stream may be read
/// concurrently without coordination). The adaptor opens the partition before
/// calling `f`; `f` is responsible for calling `end_partition` itself, same as
/// the serial form above.
pub fn for_each_partition_parallel<E: PlainData>(
    dispatcher: &dyn TaskDispatcher,
    readers: Vec<Reader<E>>,
    f: impl Fn(&mut Reader<E>, usize) + Send + Sync + Clone + 'static,
) -> Arc<dyn TaskHandle> {
    let mut completion = CompletionSet::new();
    for reader in &readers {
        let partitions = reader.partition_count();
        for partition_index in 0..partitions {
            let mut reader = reader.clone();
            let f = f.clone();
            let handle = dispatcher.dispatch(Box::new(move || {
                reader
                    .begin_partition(partition_index)
                    .unwrap_or_else(|e| panic!("partition {partition_index}: {e}"));
                f(&mut reader, partition_index);
            }));
            completion.merge(handle);
        }
    }
    completion.as_handle()
}

/// Whole-reader (§4.5 #3), serial form: invokes `f` once per `(reader,
/// reader_index)` — used when the consumer needs cross-partition state.
pub fn for_each_reader_serial<E: PlainData>(
    readers: &mut [Reader<E>],
    mut f: impl FnMut(&mut Reader<E>, usize),
) -> Arc<dyn TaskHandle> {
    for (index, reader) in readers.iter_mut().enumerate() {
        f(reader, index);
    }
    Arc::new(NullHandle)
}

/// Whole-reader (§4.5 #3), parallel fan-out form: dispatches one task per
/// reader.
pub fn for_each_reader_parallel<E: PlainData>(
    dispatcher: &dyn TaskDispatcher,
    readers: Vec<Reader<E>>,
    f: impl Fn(Reader<E>, usize) + Send + Sync + Clone + 'static,
) -> Arc<dyn TaskHandle> {
    let mut completion = CompletionSet::new();
    for (index, reader) in readers.into_iter().enumerate() {
        let f = f.clone();
        let handle = dispatcher.dispatch(Box::new(move || f(reader, index)));
        completion.merge(handle);
    }
    completion.as_handle()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_pool::{BlockPool, BlockPoolConfig};
    use crate::handle::StaticThreadContext;
    use crate::stream::ThreadStream;
    use crate::sync::Mutex;

    struct ThreadScopeDispatcher;

    impl TaskDispatcher for ThreadScopeDispatcher {
        fn dispatch(&self, task: Box<dyn FnOnce() + Send>) -> Arc<dyn TaskHandle> {
            // No real job graph in tests: run inline and report complete,
            // same contract a zero-latency host scheduler would provide.
            task();
            Arc::new(NullHandle)
        }
    }

    #[test]
    fn for_each_event_serial_visits_every_item_once() {
        let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
        let stream = ThreadStream::<u32>::new(pool, 2).unwrap();
        let writer = stream.writer();
        writer.write(&StaticThreadContext(0), 1).unwrap();
        writer.write(&StaticThreadContext(1), 2).unwrap();
        writer.write(&StaticThreadContext(1), 3).unwrap();

        let mut readers = vec![stream.reader()];
        let seen = Mutex::new(Vec::new());
        let handle = for_each_event_serial(&mut readers, |item: u32| seen.lock().push(item));
        handle.wait();

        let mut observed = seen.lock().clone();
        observed.sort();
        assert_eq!(observed, vec![1, 2, 3]);
    }

    #[test]
    fn for_each_partition_serial_visits_every_partition_once() {
        let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
        let stream = ThreadStream::<u32>::new(pool, 3).unwrap();
        let writer = stream.writer();
        writer.write(&StaticThreadContext(0), 10).unwrap();

        let mut readers = vec![stream.reader()];
        let visited = Mutex::new(Vec::new());
        let handle = for_each_partition_serial(&mut readers, |reader, index| {
            let count = reader.total_item_count();
            visited.lock().push((index, count));
            reader.end_partition().unwrap();
        });
        handle.wait();
        assert_eq!(visited.lock().len(), 3);
    }

    #[test]
    fn for_each_partition_parallel_visits_every_partition_once() {
        let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
        let stream = ThreadStream::<u32>::new(pool, 3).unwrap();
        let writer = stream.writer();
        writer.write(&StaticThreadContext(0), 10).unwrap();
        writer.write(&StaticThreadContext(2), 20).unwrap();
        writer.write(&StaticThreadContext(2), 21).unwrap();

        let readers = vec![stream.reader()];
        let seen = Mutex::new(Vec::new());
        let dispatcher = ThreadScopeDispatcher;
        let handle = for_each_partition_parallel(&dispatcher, readers, move |reader, index| {
            let mut items = Vec::new();
            while let Ok(item) = reader.read() {
                items.push(item);
            }
            reader.end_partition().unwrap();
            seen.lock().push((index, items));
        });
        handle.wait();

        let mut observed = seen.lock().clone();
        observed.sort_by_key(|(index, _)| *index);
        assert_eq!(observed, vec![(0, vec![10]), (1, vec![]), (2, vec![20, 21])]);
    }

    #[test]
    fn for_each_reader_parallel_dominates_every_dispatched_task() {
        let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
        let a = ThreadStream::<u32>::new(pool.clone(), 1).unwrap();
        let b = ThreadStream::<u32>::new(pool, 1).unwrap();
        a.writer().write(&StaticThreadContext(0), 7).unwrap();
        b.writer().write(&StaticThreadContext(0), 8).unwrap();

        let readers = vec![a.reader(), b.reader()];
        let total = Arc::new(Mutex::new(0u32));
        let dispatcher = ThreadScopeDispatcher;
        let totals = total.clone();
        let handle = for_each_reader_parallel(&dispatcher, readers, move |mut reader, _index| {
            let count = reader.begin_partition(0).unwrap();
            for _ in 0..count {
                *totals.lock() += reader.read().unwrap();
            }
            reader.end_partition().unwrap();
        });
        handle.wait();
        assert_eq!(*total.lock(), 15);
    }
}
