//! Blocking TCP client: a connected stream plus a response read thread.
//!
//! The read thread mirrors the server's per-connection loop: it fills a
//! buffer from the socket, hands it to the response handler, and
//! delivers `None` once on disconnect. Sends happen on the caller's
//! thread; the client does not serialize concurrent senders (the
//! request/response façade layers a mutex or batcher on top).

use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::config::SocketOpts;
use crate::error::Error;
use crate::tcp::{self, ConnHandler};

/// Framing-agnostic TCP client.
pub struct TcpClient {
    stream: TcpStream,
    closed: AtomicBool,
    read_thread: Option<JoinHandle<()>>,
}

impl TcpClient {
    /// Connect to `ip:port`, apply socket tuning, and start the response
    /// read thread. `resp_handler` observes every inbound chunk and the
    /// final `None` disconnect signal.
    pub fn new(
        ip: &str,
        port: u16,
        opts: SocketOpts,
        resp_handler: ConnHandler,
    ) -> Result<Self, Error> {
        opts.validate()?;

        let stream = TcpStream::connect((ip, port)).map_err(Error::Io)?;
        tcp::tune_stream(&stream, &opts);

        let read_stream = stream.try_clone().map_err(Error::Io)?;
        let read_buf_size = opts.read_buf_size;
        let read_thread = thread::Builder::new()
            .name("batchline-client-rx".to_string())
            .spawn(move || {
                tcp::conn_read_loop(read_stream, read_buf_size, resp_handler);
            })
            .map_err(Error::Io)?;

        Ok(TcpClient {
            stream,
            closed: AtomicBool::new(false),
            read_thread: Some(read_thread),
        })
    }

    /// Write all of `data`, looping over short writes.
    pub fn send_bytes(&self, data: &[u8]) -> Result<(), Error> {
        tcp::send_all(&mut &self.stream, data)
    }

    /// Shut the socket down and join the read thread; the response
    /// handler receives its `None` disconnect signal first. Idempotent.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(handle) = self.read_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{NewConnHandler, TcpServer};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn echo_server() -> TcpServer {
        let factory: Arc<NewConnHandler> = Arc::new(|stream: TcpStream| {
            let mut stream = stream;
            let handler: ConnHandler =
                Box::new(move |buf: Option<&mut crate::buffer::ByteBuffer>| {
                    if let Some(buf) = buf {
                        let data = buf.read_all();
                        tcp::send_all(&mut stream, &data)?;
                    }
                    Ok(())
                });
            handler
        });
        TcpServer::new(0, SocketOpts::default(), factory).unwrap()
    }

    #[test]
    fn round_trip_via_response_handler() {
        let server = echo_server();
        let (tx, rx) = mpsc::channel();

        let handler: ConnHandler = Box::new(move |buf| {
            if let Some(buf) = buf {
                tx.send(buf.read_all()).unwrap();
            }
            Ok(())
        });

        let client = TcpClient::new("127.0.0.1", server.port(), SocketOpts::default(), handler)
            .unwrap();
        client.send_bytes(b"hello").unwrap();

        let echoed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(echoed, b"hello");
    }

    #[test]
    fn close_delivers_disconnect_signal() {
        let server = echo_server();
        let disconnected = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&disconnected);

        let handler: ConnHandler = Box::new(move |buf| {
            if buf.is_none() {
                *flag.lock().unwrap() = true;
            }
            Ok(())
        });

        let mut client =
            TcpClient::new("127.0.0.1", server.port(), SocketOpts::default(), handler).unwrap();
        client.close();
        assert!(*disconnected.lock().unwrap());
    }
}
