use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use batchline::{Batcher, BatcherOpts};
use criterion::{Criterion, criterion_group, criterion_main};

fn quiet_opts(batch_size: usize) -> BatcherOpts {
    BatcherOpts::new(batch_size)
        .queue_size(batch_size * 16)
        .window(Duration::from_secs(3600))
}

fn counting_batcher(batch_size: usize) -> (Batcher<u64>, Arc<AtomicU64>) {
    let consumed = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&consumed);
    let batcher = Batcher::new(quiet_opts(batch_size), move |batch: &mut Vec<u64>| {
        sink.fetch_add(batch.len() as u64, Ordering::Relaxed);
        Ok(())
    })
    .unwrap();
    (batcher, consumed)
}

fn bench_throughput(c: &mut Criterion) {
    c.bench_function("sp_add_1k_batch_1024", |b| {
        let (batcher, _consumed) = counting_batcher(1024);
        b.iter(|| {
            for i in 0..1000u64 {
                batcher.add(i);
            }
        });
    });

    c.bench_function("sp_add_many_1k_batch_1024", |b| {
        let (batcher, _consumed) = counting_batcher(1024);
        b.iter(|| {
            batcher.add_many(0..1000u64);
        });
    });

    c.bench_function("mp4_add_4k_batch_1024", |b| {
        let (batcher, _consumed) = counting_batcher(1024);
        let batcher = Arc::new(batcher);
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let batcher = Arc::clone(&batcher);
                    thread::spawn(move || {
                        for i in 0..1000u64 {
                            batcher.add(i);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_throughput);
criterion_main!(benches);
