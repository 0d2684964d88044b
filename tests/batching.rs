//! Integration tests for the multi-producer batcher: completeness,
//! ordering, batch sizing, back-pressure, and bounded memory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use batchline::{Batcher, BatcherOpts};

/// A window long enough that the flush timer never fires mid-test.
fn quiet_window() -> Duration {
    Duration::from_secs(3600)
}

#[test]
fn multi_producer_completeness_and_per_producer_order() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: u64 = 500;

    let consumed: Arc<Mutex<Vec<(usize, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&consumed);
    let batcher = Arc::new(
        Batcher::new(
            BatcherOpts::new(64).queue_size(256).window(quiet_window()),
            move |batch: &mut Vec<(usize, u64)>| {
                sink.lock().unwrap().extend_from_slice(batch);
                Ok(())
            },
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let batcher = Arc::clone(&batcher);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    batcher.add((producer, seq));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut batcher = Arc::into_inner(batcher).expect("all producers joined");
    batcher.flush();
    batcher.close();

    let items = consumed.lock().unwrap();
    assert_eq!(items.len(), PRODUCERS * PER_PRODUCER as usize);

    // Items from any single producer arrive in submission order.
    let mut next_seq = [0u64; PRODUCERS];
    for &(producer, seq) in items.iter() {
        assert_eq!(seq, next_seq[producer], "producer {producer} out of order");
        next_seq[producer] += 1;
    }
    assert!(next_seq.iter().all(|&n| n == PER_PRODUCER));
}

#[test]
fn non_final_batches_are_exactly_batch_size() {
    let sizes: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sizes);
    let mut batcher = Batcher::new(
        BatcherOpts::new(5).queue_size(20).window(quiet_window()),
        move |batch: &mut Vec<u32>| {
            sink.lock().unwrap().push(batch.len());
            Ok(())
        },
    )
    .unwrap();

    for i in 0..17 {
        batcher.add(i);
    }
    batcher.flush();
    batcher.close();

    let sizes = sizes.lock().unwrap();
    assert_eq!(*sizes, vec![5, 5, 5, 2]);
}

#[test]
fn add_many_runs_are_contiguous_across_producers() {
    const PRODUCERS: usize = 4;
    const RUN: u64 = 100;

    let consumed: Arc<Mutex<Vec<(usize, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&consumed);
    let batcher = Arc::new(
        Batcher::new(
            BatcherOpts::new(8).queue_size(64).window(quiet_window()),
            move |batch: &mut Vec<(usize, u64)>| {
                sink.lock().unwrap().extend_from_slice(batch);
                Ok(())
            },
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let batcher = Arc::clone(&batcher);
            thread::spawn(move || {
                batcher.add_many((0..RUN).map(move |seq| (producer, seq)));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut batcher = Arc::into_inner(batcher).expect("all producers joined");
    batcher.flush();
    batcher.close();

    // Each producer's run appears as one uninterrupted, in-order slice
    // of the concatenated consume stream.
    let items = consumed.lock().unwrap();
    assert_eq!(items.len(), PRODUCERS * RUN as usize);
    let mut pos = 0;
    while pos < items.len() {
        let (producer, first_seq) = items[pos];
        assert_eq!(first_seq, 0, "run of producer {producer} interleaved");
        for seq in 0..RUN {
            assert_eq!(items[pos], (producer, seq));
            pos += 1;
        }
    }
}

#[test]
fn back_pressure_blocks_producers_at_capacity() {
    // batch_size=10, queue_size=10: one current back-buffer plus one
    // queued, so a stalled consumer admits exactly 20 items.
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
    let consumed = Arc::new(AtomicUsize::new(0));
    let consumed_in_sink = Arc::clone(&consumed);

    let batcher = Arc::new(
        Batcher::new(
            BatcherOpts::new(10).queue_size(10).window(quiet_window()),
            move |batch: &mut Vec<u32>| {
                gate_rx.recv().expect("gate closed early");
                consumed_in_sink.fetch_add(batch.len(), Ordering::SeqCst);
                Ok(())
            },
        )
        .unwrap(),
    );

    let progress = Arc::new(AtomicUsize::new(0));
    let producer_progress = Arc::clone(&progress);
    let producer = {
        let batcher = Arc::clone(&batcher);
        thread::spawn(move || {
            for i in 0..30u32 {
                batcher.add(i);
                producer_progress.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    // The producer fills both back-buffers and stalls on the 21st item.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while progress.load(Ordering::SeqCst) < 20 {
        assert!(std::time::Instant::now() < deadline, "producer never reached 20");
        thread::sleep(Duration::from_millis(5));
    }
    thread::sleep(Duration::from_millis(200));
    assert_eq!(progress.load(Ordering::SeqCst), 20, "producer ran past capacity");

    // Release the consumer and let everything drain.
    for _ in 0..8 {
        gate_tx.send(()).unwrap();
    }
    producer.join().unwrap();
    let mut batcher = Arc::into_inner(batcher).expect("producer joined");
    batcher.flush();
    batcher.close();
    assert_eq!(consumed.load(Ordering::SeqCst), 30);
}

#[test]
fn timed_flush_delivers_partial_batch() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut batcher = Batcher::new(
        BatcherOpts::new(1000).window(Duration::from_millis(25)),
        move |batch: &mut Vec<u32>| {
            for item in batch.iter() {
                let _ = tx.send(*item);
            }
            Ok(())
        },
    )
    .unwrap();

    batcher.add(7);
    // Two windows is the contract's upper bound; allow scheduling slack.
    let got = rx.recv_timeout(Duration::from_millis(500));
    assert_eq!(got, Ok(7));
    batcher.close();
}

#[test]
fn invalid_queue_size_rejected() {
    let result = Batcher::<u32>::new(BatcherOpts::new(10).queue_size(15), |_| Ok(()));
    assert!(result.is_err());
}
