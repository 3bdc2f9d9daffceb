//! Multi-producer / multi-consumer event bus built on a block-allocated,
//! append-only stream container. Producer tasks append typed events in
//! parallel without cross-thread coordination; consumer tasks read them back
//! in parallel with well-defined partitioning. A per-event-type
//! [`EventSystem`](event_system::EventSystem) mediates these exchanges
//! across a scheduling tick so producers and consumers compose into a task
//! graph with precise dependency edges.
//!
//! Out of scope: the host task scheduler (only its required contract is
//! specified, see [`handle`]), the host allocator, code generation for
//! iterating entities, and CLI/GUI surfaces.

mod block_pool;
mod consumer;
mod error;
mod event_system;
mod handle;
mod plain;
mod stream;
mod sync;

pub use block_pool::{BlockPool, BlockPoolConfig, BLOCK_SIZE};
pub use consumer::{
    for_each_event_parallel, for_each_event_serial, for_each_partition_parallel, for_each_partition_serial,
    for_each_reader_parallel, for_each_reader_serial, TaskDispatcher,
};
pub use error::{EventBusError, Result};
pub use event_system::{EventSystem, ModeBusRegistry, WorldMode};
pub use handle::{combine, CompletionSet, NullHandle, StaticThreadContext, TaskContext, TaskHandle};
pub use plain::PlainData;
pub use stream::{IndexStream, IndexWriter, Reader, StreamReader, ThreadStream, ThreadWriter};
