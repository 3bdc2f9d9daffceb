//! Typed diagnostics for the rendezvous protocol and the stream wire
//! framing (§7 of the design spec: Protocol / Capacity / Shape / Type /
//! Resource error kinds).
//!
//! Every fallible public entry point returns `Result<T, EventBusError>`.
//! Whether a given misuse is *caught* as one of these variants or left as
//! undefined behavior depends on the build: checks the spec calls out as
//! "undefined behavior in unchecked builds" are only performed
//! `#[cfg(debug_assertions)]`; in release builds the equivalent call sites
//! use `debug_assert!` alone and trust the caller, exactly like
//! `rc_event_queue`'s own `debug_assert!`-only posture and the invariant
//! gating `ringmpsc-rs::invariants` uses for its ring-buffer preconditions.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EventBusError>;

/// All recoverable failures the bus and its streams can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventBusError {
    // ---- Protocol -------------------------------------------------------
    /// `create_writer::<E>()` called twice without an intervening
    /// `add_producer_handle::<E>`.
    #[error("create_writer called again before the previous writer's producer handle was published")]
    UnpairedWriter,

    /// `acquire_readers::<E>()` called twice without an intervening
    /// `add_consumer_handle::<E>`.
    #[error("acquire_readers called again before the previous reader set's consumer handle was published")]
    UnpairedReader,

    /// `create_writer` while a reader is outstanding for the same event type.
    #[error("create_writer is not allowed while a reader is open for this event type")]
    WriterWhileReaderOpen,

    /// `acquire_readers` while a writer is outstanding for the same event type.
    #[error("acquire_readers is not allowed while a writer is open for this event type")]
    ReaderWhileWriterOpen,

    /// `add_producer_handle` called with no writer currently open.
    #[error("add_producer_handle called with no writer currently open")]
    NoWriterOpen,

    /// `add_consumer_handle` called with no reader currently open.
    #[error("add_consumer_handle called with no reader currently open")]
    NoReaderOpen,

    /// `begin_partition(i)` called on an `IndexWriter` index that was already
    /// opened once before on this stream.
    #[error("partition {index} was already opened once on this stream")]
    PartitionReopened { index: usize },

    /// `begin_partition` called while another partition is still open on the
    /// same writer (canonical, non-eliding form).
    #[error("begin_partition called while partition {index} is still open")]
    PartitionAlreadyOpen { index: usize },

    /// `write` called on an `IndexWriter` with no partition currently open.
    #[error("write called with no partition open on this IndexWriter")]
    NoOpenPartition,

    /// An invalid, non-positive count argument was supplied (e.g. partition
    /// count <= 0 for an `IndexStream`).
    #[error("count argument must be > 0, got {value}")]
    NonPositiveCount { value: isize },

    // ---- Capacity ---------------------------------------------------------
    /// Requested partition count for a `ThreadStream` exceeds `MaxThreads`.
    #[error("requested thread-partition count {requested} exceeds MaxThreads ({max})")]
    TooManyThreads { requested: usize, max: usize },

    /// `begin_partition(i)` called with `i` outside `[0, partition_count)`.
    #[error("partition index {index} is out of range for {count} partitions")]
    PartitionIndexOutOfRange { index: isize, count: usize },

    // ---- Shape --------------------------------------------------------
    /// `end_partition` called while unread items remain.
    #[error("end_partition called with {remaining} of {total} items still unread")]
    IncompletePartitionRead { remaining: usize, total: usize },

    /// `read`/`peek` called before any `begin_partition`.
    #[error("read called before any begin_partition")]
    NoActivePartition,

    /// `read`/`peek` called past the end of the current partition.
    #[error("read past end of partition (already consumed {consumed} of {total})")]
    OverRead { consumed: usize, total: usize },

    // ---- Type -----------------------------------------------------------
    /// A value whose layout is not plain bit-copyable data was passed to a
    /// stream write. In this crate the `PlainData` marker trait bound makes
    /// this unreachable at the type level for `write`/`read`; the variant
    /// exists for `write_large`/`read_large` callers that hand the API a
    /// `TypeId` to validate out of band, and for parity with the language
    /// neutral spec.
    #[error("value type is not plain bit-copyable data")]
    NotPlainData,

    // ---- Resource -------------------------------------------------------
    /// The underlying system allocator refused a block allocation. Fatal:
    /// callers should propagate this with `?` rather than retry.
    #[error("block pool allocator exhausted")]
    AllocatorExhausted,

    /// An unknown or invalid `WorldMode` configuration was supplied at
    /// `EventSystem` construction.
    #[error("invalid event system mode configuration: {reason}")]
    InvalidMode { reason: &'static str },
}
