//! Single-partition write/read throughput: the baseline cost of the block
//! chain with no cross-thread contention.

use block_event_bus::{BlockPool, BlockPoolConfig, StaticThreadContext, StreamReader, ThreadStream};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("push");

    for &count in &[1_000usize, 100_000, 1_000_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
                let stream = ThreadStream::<u64>::new(pool, 1).unwrap();
                let writer = stream.writer();
                let ctx = StaticThreadContext(0);
                for i in 0..count as u64 {
                    writer.write(&ctx, black_box(i)).unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    for &count in &[1_000usize, 100_000, 1_000_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
            let stream = ThreadStream::<u64>::new(pool, 1).unwrap();
            let writer = stream.writer();
            let ctx = StaticThreadContext(0);
            for i in 0..count as u64 {
                writer.write(&ctx, i).unwrap();
            }

            b.iter(|| {
                let mut reader = stream.reader();
                reader.begin_partition(0).unwrap();
                for _ in 0..count {
                    black_box(reader.read().unwrap());
                }
                reader.end_partition().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_push, bench_read);
criterion_main!(benches);
