//! Multi-producer batcher: coalesces items from many threads into
//! bounded, contiguous batches handed to a single consumer.
//!
//! The batcher owns `1 + queue_size / batch_size` pre-allocated
//! back-buffers that cycle free → current → ready → consume → free.
//! Producers append to the *current* back-buffer under a spin lock (the
//! fast path never parks a thread); when the buffer fills it is pushed
//! onto the bounded *ready* queue and a recycled one is pulled from the
//! *free* queue under a separate blocking lock (the slow path never
//! spins). Back-pressure falls out of the free queue: producers wait
//! only when every back-buffer is full and unconsumed.
//!
//! Two background threads complete the engine: the consumer pops ready
//! batches and invokes the user's `consume`, and a timer flushes the
//! partial batch every `window` so a quiet producer never strands items.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, error};

use crate::config::BatcherOpts;
use crate::error::Error;
use crate::metrics;
use crate::spin::SpinLock;

/// Multi-producer, single-consumer batch coalescer.
///
/// `add` may be called from any number of threads. Items are delivered
/// to the consumer in batches of exactly `batch_size`, except the final
/// batch of a flush which may be shorter. A zero-length batch is
/// reserved internally as the close sentinel and is never delivered.
///
/// Dropping the batcher closes it; [`Batcher::close`] does the same
/// explicitly and is idempotent.
pub struct Batcher<T> {
    shared: Arc<Shared<T>>,
    consumer: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

struct Shared<T> {
    batch_size: usize,
    /// Fast path: the back-buffer producers are currently appending to.
    /// `None` between a flush and the next refill.
    current: SpinLock<Option<Vec<T>>>,
    /// Slow path: serializes waits on the free queue so exactly one
    /// producer at a time installs a recycled back-buffer. Also held for
    /// the whole of `add_many` to keep its items contiguous.
    refill: Mutex<()>,
    ready_tx: Sender<Vec<T>>,
    free_rx: Receiver<Vec<T>>,
    closed: AtomicBool,
}

impl<T: Send + 'static> Batcher<T> {
    /// Create a batcher with a dedicated consumer thread.
    ///
    /// `consume` receives each filled batch; an error is logged and
    /// counted but does not stop the consumer. Returns
    /// [`Error::InvalidConfiguration`] when `opts` is out of range.
    pub fn new<F>(opts: BatcherOpts, mut consume: F) -> Result<Self, Error>
    where
        F: FnMut(&mut Vec<T>) -> Result<(), Error> + Send + 'static,
    {
        opts.validate()?;

        let total_buffers = 1 + opts.queue_size / opts.batch_size;
        let (ready_tx, ready_rx) = bounded::<Vec<T>>(total_buffers);
        let (free_tx, free_rx) = bounded::<Vec<T>>(total_buffers);
        for _ in 0..total_buffers {
            free_tx
                .send(Vec::with_capacity(opts.batch_size))
                .expect("free queue sized for all back-buffers");
        }

        let shared = Arc::new(Shared {
            batch_size: opts.batch_size,
            current: SpinLock::new(None),
            refill: Mutex::new(()),
            ready_tx,
            free_rx,
            closed: AtomicBool::new(false),
        });

        let consumer = thread::Builder::new()
            .name("batchline-batcher".to_string())
            .spawn(move || {
                crate::counter::register_thread(crate::counter::ThreadRole::Consumer);
                consumer_loop(ready_rx, free_tx, &mut consume);
            })
            .map_err(Error::Io)?;

        let timer_shared = Arc::clone(&shared);
        let window = opts.window;
        let timer = thread::Builder::new()
            .name("batchline-batcher-timer".to_string())
            .spawn(move || {
                while !timer_shared.closed.load(Ordering::Acquire) {
                    thread::park_timeout(window);
                    if timer_shared.closed.load(Ordering::Acquire) {
                        return;
                    }
                    timer_shared.flush();
                }
            });
        let timer = match timer {
            Ok(handle) => handle,
            Err(err) => {
                // Unwind the consumer before reporting the failure.
                shared.closed.store(true, Ordering::Release);
                let _ = shared.ready_tx.send(Vec::new());
                let _ = consumer.join();
                return Err(Error::Io(err));
            }
        };

        Ok(Batcher {
            shared,
            consumer: Some(consumer),
            timer: Some(timer),
        })
    }

    /// Append one item.
    ///
    /// Blocks only when all back-buffers are full and unconsumed.
    ///
    /// # Panics
    ///
    /// Panics when called after [`Batcher::close`].
    pub fn add(&self, item: T) {
        // Fast path: current buffer present, append under the spin lock.
        {
            let mut cur = self.shared.current.lock();
            if cur.is_some() {
                self.shared.append_locked(&mut cur, item);
                return;
            }
        }

        // Slow path: win the refill race, then block on the free queue.
        let _refill = lock_refill(&self.shared.refill);
        let mut cur = self.shared.current.lock();
        if cur.is_none() {
            drop(cur);
            let fresh = self.shared.recv_free();
            cur = self.shared.current.lock();
            *cur = Some(fresh);
        }
        self.shared.append_locked(&mut cur, item);
    }

    /// Append many items as one uninterrupted run.
    ///
    /// Chunks across back-buffers without admitting other producers in
    /// between, so the items reach the consumer contiguously and in
    /// order even when they span several batches.
    ///
    /// # Panics
    ///
    /// Panics when called after [`Batcher::close`].
    pub fn add_many<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        // Holding the refill lock for the whole call excludes other
        // producers: whenever the spin lock is released below, `current`
        // is absent, which diverts every concurrent `add` into the slow
        // path where it parks on this lock.
        let _refill = lock_refill(&self.shared.refill);
        let mut items = items.into_iter();

        loop {
            let mut cur = self.shared.current.lock();
            if cur.is_none() {
                drop(cur);
                let fresh = self.shared.recv_free();
                cur = self.shared.current.lock();
                *cur = Some(fresh);
            }
            let buf = cur.as_mut().expect("current installed above");
            while buf.len() < self.shared.batch_size {
                match items.next() {
                    Some(item) => buf.push(item),
                    None => return,
                }
            }
            let full = cur.take().expect("current checked above");
            self.shared.push_ready(full);
        }
    }

    /// Force the current partial batch onto the ready queue.
    ///
    /// An empty current batch is left alone; zero-length batches are
    /// reserved as the close sentinel.
    pub fn flush(&self) {
        self.shared.flush();
    }

    /// Flush, deliver the close sentinel, and join the background
    /// threads once the consumer has drained the ready queue.
    ///
    /// Idempotent; subsequent calls return immediately.
    pub fn close(&mut self) {
        self.close_inner();
    }
}

impl<T> Batcher<T> {
    fn close_inner(&mut self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.flush();
        let _ = self.shared.ready_tx.send(Vec::new());
        if let Some(timer) = self.timer.take() {
            timer.thread().unpark();
            let _ = timer.join();
        }
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }
    }
}

impl<T> Drop for Batcher<T> {
    fn drop(&mut self) {
        self.close_inner();
    }
}

impl<T> Shared<T> {
    /// Append one item to the installed current buffer and hand it to
    /// the ready queue if it just filled. Caller holds the spin lock.
    fn append_locked(&self, cur: &mut crate::spin::SpinGuard<'_, Option<Vec<T>>>, item: T) {
        let buf = cur.as_mut().expect("caller checked current is installed");
        buf.push(item);
        if buf.len() >= self.batch_size {
            let full = cur.take().expect("current checked above");
            self.push_ready(full);
        }
    }

    /// Hand a filled back-buffer to the consumer. Never blocks: the
    /// ready queue is sized to hold every back-buffer at once.
    fn push_ready(&self, batch: Vec<T>) {
        self.ready_tx
            .send(batch)
            .expect("batcher is closed; no further items may be added");
    }

    /// Pull a recycled back-buffer off the free queue, blocking while
    /// the consumer is behind. Caller holds the refill lock.
    fn recv_free(&self) -> Vec<T> {
        match self.free_rx.recv() {
            Ok(buf) => buf,
            Err(_) => panic!("batcher is closed; no further items may be added"),
        }
    }

    fn flush(&self) {
        let mut cur = self.current.lock();
        if cur.as_ref().is_some_and(|buf| !buf.is_empty()) {
            let partial = cur.take().expect("current checked above");
            self.push_ready(partial);
        }
    }
}

fn lock_refill(refill: &Mutex<()>) -> std::sync::MutexGuard<'_, ()> {
    refill.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consumer loop: pop ready batches until the zero-length sentinel,
/// invoke `consume`, and recycle each buffer through the free queue.
fn consumer_loop<T, F>(ready_rx: Receiver<Vec<T>>, free_tx: Sender<Vec<T>>, consume: &mut F)
where
    F: FnMut(&mut Vec<T>) -> Result<(), Error>,
{
    for mut batch in ready_rx.iter() {
        if batch.is_empty() {
            debug!("batcher received close sentinel, stopping consumer");
            return;
        }
        metrics::BATCHES_CONSUMED.increment();
        metrics::BATCH_ITEMS.add(batch.len() as u64);
        if let Err(err) = consume(&mut batch) {
            metrics::BATCH_CONSUMER_ERRORS.increment();
            error!("batch consumer error: {err}");
        }
        batch.clear();
        let _ = free_tx.send(batch);
    }
}
