//! Property-based tests for the round-trip invariants enumerated in the
//! design spec's TESTABLE PROPERTIES section.
//!
//! Coverage:
//! - writing a sequence of plain values into partition 0 and reading it back
//!   in order, at the arities called out explicitly (0, 1, one-below a block,
//!   exactly a block, and spanning several blocks).
//! - `write_large`/`read_large` round-tripping arbitrary byte buffers,
//!   including ones that straddle many blocks.

use block_event_bus::{BlockPool, BlockPoolConfig, StaticThreadContext, StreamReader, ThreadStream, BLOCK_SIZE};
use proptest::prelude::*;

// u32 values are 4-byte aligned with no padding item header, so a block
// holds exactly BLOCK_SIZE / 4 of them.
const BLOCK_CAPACITY: usize = BLOCK_SIZE / 4;

fn round_trip_u32_sequence(values: &[u32]) {
    let pool = std::sync::Arc::new(BlockPool::new(BlockPoolConfig::default()));
    let stream = ThreadStream::<u32>::new(pool, 1).unwrap();
    let writer = stream.writer();
    let ctx = StaticThreadContext(0);
    for &v in values {
        writer.write(&ctx, v).unwrap();
    }

    let mut reader = stream.reader();
    let count = reader.begin_partition(0).unwrap();
    assert_eq!(count, values.len());
    for &expected in values {
        assert_eq!(reader.read().unwrap(), expected);
    }
    reader.end_partition().unwrap();
}

proptest! {
    #[test]
    fn round_trip_arbitrary_length(values in prop::collection::vec(any::<u32>(), 0..4000)) {
        round_trip_u32_sequence(&values);
    }
}

#[test]
fn round_trip_at_named_arities() {
    for &arity in &[0usize, 1, BLOCK_CAPACITY - 1, BLOCK_CAPACITY, 2 * BLOCK_CAPACITY + 3] {
        let values: Vec<u32> = (0..arity as u32).collect();
        round_trip_u32_sequence(&values);
    }
}

fn round_trip_large_buffer(bytes: &[u8]) {
    let pool = std::sync::Arc::new(BlockPool::new(BlockPoolConfig::default()));
    let stream = ThreadStream::<u32>::new(pool, 1).unwrap();
    let writer = stream.writer();
    let ctx = StaticThreadContext(0);
    writer.write_large(&ctx, bytes).unwrap();

    let mut reader = stream.reader();
    let count = reader.begin_partition(0).unwrap();
    assert_eq!(count, 1);
    let mut out = Vec::new();
    reader.read_large(&mut out).unwrap();
    assert_eq!(out, bytes);
    reader.end_partition().unwrap();
}

proptest! {
    #[test]
    fn large_write_round_trips_arbitrary_buffers(bytes in prop::collection::vec(any::<u8>(), 0..20_000)) {
        round_trip_large_buffer(&bytes);
    }
}

#[test]
fn large_write_round_trips_at_named_sizes() {
    for &len in &[1usize, 5120, 81920, 655360] {
        let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        round_trip_large_buffer(&bytes);
    }
}
