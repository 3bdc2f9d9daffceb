//! Multi-threaded fan-out: N producer threads each writing into their own
//! `ThreadStream` partition, read back by one consumer thread per partition.

use block_event_bus::{BlockPool, BlockPoolConfig, StaticThreadContext, StreamReader, ThreadStream};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

const MSG_PER_PRODUCER: u64 = 100_000;

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("mt_fanout");

    for &producers in &[2usize, 4, 8] {
        let total = MSG_PER_PRODUCER * producers as u64;
        group.throughput(Throughput::Elements(total));

        group.bench_with_input(BenchmarkId::from_parameter(producers), &producers, |b, &producers| {
            b.iter(|| {
                let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
                let stream = ThreadStream::<u64>::new(pool, producers).unwrap();
                let writer = stream.writer();

                std::thread::scope(|scope| {
                    for p in 0..producers {
                        let writer = writer.clone();
                        scope.spawn(move || {
                            let ctx = StaticThreadContext(p);
                            for i in 0..MSG_PER_PRODUCER {
                                writer.write(&ctx, i).unwrap();
                            }
                        });
                    }
                });

                let mut readers: Vec<_> = (0..producers).map(|_| stream.reader()).collect();
                std::thread::scope(|scope| {
                    for (p, reader) in readers.iter_mut().enumerate() {
                        scope.spawn(move || {
                            reader.begin_partition(p).unwrap();
                            for _ in 0..MSG_PER_PRODUCER {
                                black_box(reader.read().unwrap());
                            }
                            reader.end_partition().unwrap();
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out);
criterion_main!(benches);
