//! Blocking TCP server: one accept thread per listener, one read thread
//! per connection.
//!
//! The server knows nothing about framing. Each accepted connection gets
//! a handler from the caller-supplied factory and a read buffer; the
//! read loop feeds the handler after every socket read and hands it
//! `None` once when the connection goes down. Writes are the handler's
//! business (the factory receives a stream clone); the server never
//! serializes them.

use std::net::{TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::config::SocketOpts;
use crate::connection::ConnRegistry;
use crate::error::Error;
use crate::metrics;
use crate::tcp::{self, ConnHandler};

/// Factory invoked once per accepted connection with a stream clone for
/// writing. The returned handler owns all per-connection state.
pub type NewConnHandler = dyn Fn(TcpStream) -> ConnHandler + Send + Sync;

/// Framing-agnostic TCP server.
pub struct TcpServer {
    listener: Arc<TcpListener>,
    port: u16,
    closed: Arc<AtomicBool>,
    registry: Arc<ConnRegistry>,
    accept_thread: Option<JoinHandle<()>>,
}

impl TcpServer {
    /// Bind `port` (0 = OS-chosen) and start accepting.
    pub fn new(
        port: u16,
        opts: SocketOpts,
        new_handler: Arc<NewConnHandler>,
    ) -> Result<Self, Error> {
        opts.validate()?;

        let listener = Arc::new(TcpListener::bind(("0.0.0.0", port)).map_err(Error::Io)?);
        let port = listener.local_addr().map_err(Error::Io)?.port();
        let closed = Arc::new(AtomicBool::new(false));
        let registry = Arc::new(ConnRegistry::new());

        let accept_listener = Arc::clone(&listener);
        let accept_closed = Arc::clone(&closed);
        let accept_registry = Arc::clone(&registry);
        let accept_thread = thread::Builder::new()
            .name("batchline-acceptor".to_string())
            .spawn(move || {
                crate::counter::register_thread(crate::counter::ThreadRole::Acceptor);
                accept_loop(
                    &accept_listener,
                    opts,
                    &new_handler,
                    &accept_closed,
                    &accept_registry,
                );
            })
            .map_err(Error::Io)?;

        Ok(TcpServer {
            listener,
            port,
            closed,
            registry,
            accept_thread: Some(accept_thread),
        })
    }

    /// The port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of currently live connections.
    pub fn active_connections(&self) -> usize {
        self.registry.active_count()
    }

    /// Stop accepting and signal every live connection's read loop via
    /// socket EOF. Connection threads run their teardown (the `None`
    /// handler call) and exit on their own. Idempotent.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Unblocks the accept thread without racing the fd close that
        // happens when the listener is dropped.
        unsafe {
            libc::shutdown(self.listener.as_raw_fd(), libc::SHUT_RDWR);
        }
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        self.registry.shutdown_all();
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.close();
    }
}

fn accept_loop(
    listener: &TcpListener,
    opts: SocketOpts,
    new_handler: &Arc<NewConnHandler>,
    closed: &AtomicBool,
    registry: &Arc<ConnRegistry>,
) {
    loop {
        let (stream, peer_addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(err) => {
                if closed.load(Ordering::Acquire) {
                    debug!("listener closed, accept loop exiting");
                    return;
                }
                warn!("failed to accept connection: {err}");
                continue;
            }
        };

        metrics::CONNECTIONS_ACCEPTED.increment();
        debug!("accepted connection from {peer_addr}");
        tcp::tune_stream(&stream, &opts);

        let registry_stream = match stream.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                warn!("failed to clone accepted stream: {err}");
                continue;
            }
        };
        let handler_stream = match stream.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                warn!("failed to clone accepted stream: {err}");
                continue;
            }
        };

        let handler = new_handler(handler_stream);
        let slot = registry.register(registry_stream);
        let conn_registry = Arc::clone(registry);
        let read_buf_size = opts.read_buf_size;

        let spawned = thread::Builder::new()
            .name(format!("batchline-conn-{peer_addr}"))
            .spawn(move || {
                tcp::conn_read_loop(stream, read_buf_size, handler);
                conn_registry.release(slot);
                metrics::CONNECTIONS_CLOSED.increment();
            });
        if let Err(err) = spawned {
            warn!("failed to spawn connection thread: {err}");
            registry.release(slot);
        }
    }
}
