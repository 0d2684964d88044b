//! Registry of live server connections, used to signal their read loops
//! on server close.
//!
//! Slots are reused through a free list so a long-lived server with
//! connection churn keeps the registry small. Each connection thread
//! registers a clone of its stream on entry and releases the slot on
//! exit; `shutdown_all` shuts every registered socket down so the owning
//! read loop observes EOF and runs its teardown path.

use std::net::{Shutdown, TcpStream};
use std::sync::{Mutex, PoisonError};

#[derive(Default)]
pub(crate) struct ConnRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    slots: Vec<Option<TcpStream>>,
    free_list: Vec<usize>,
}

impl ConnRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns the slot index for `release`.
    pub(crate) fn register(&self, stream: TcpStream) -> usize {
        let mut inner = self.lock();
        match inner.free_list.pop() {
            Some(idx) => {
                inner.slots[idx] = Some(stream);
                idx
            }
            None => {
                inner.slots.push(Some(stream));
                inner.slots.len() - 1
            }
        }
    }

    /// Release a slot back to the free list.
    pub(crate) fn release(&self, idx: usize) {
        let mut inner = self.lock();
        if inner.slots[idx].take().is_some() {
            inner.free_list.push(idx);
        }
    }

    /// Number of live connections.
    pub(crate) fn active_count(&self) -> usize {
        let inner = self.lock();
        inner.slots.len() - inner.free_list.len()
    }

    /// Shut down every registered socket. The owning read loops observe
    /// EOF and deliver their close signals; slots are released by the
    /// loops themselves as they exit.
    pub(crate) fn shutdown_all(&self) {
        let inner = self.lock();
        for stream in inner.slots.iter().flatten() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
