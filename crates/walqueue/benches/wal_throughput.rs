//! Append throughput of the durable queue with a discarding sink.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use walqueue::{NullSink, Queue, QueueConfig};

fn bench_add(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let queue = rt
        .block_on(Queue::open(QueueConfig::new(dir.path()), NullSink::new()))
        .unwrap();
    let payload = vec![0xabu8; 1024];

    let mut group = c.benchmark_group("wal");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("add_1kib_fsync", |b| {
        b.to_async(&rt).iter(|| async {
            queue.add(&payload).await.unwrap();
        });
    });
    group.finish();

    rt.block_on(queue.close()).unwrap();
}

criterion_group!(benches, bench_add);
criterion_main!(benches);
