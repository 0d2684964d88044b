use std::marker::PhantomData;
use std::net::TcpStream;
use std::sync::{Arc, Mutex, PoisonError};

use log::error;

use crate::batcher::Batcher;
use crate::buffer::{ByteBuffer, Endian};
use crate::codec::{ParseFn, WriteFn, parse_all};
use crate::config::{BatcherOpts, SocketOpts};
use crate::error::Error;
use crate::server::{NewConnHandler, TcpServer};
use crate::tcp::{self, ConnHandler};

/// Initial capacity of the per-connection response staging buffer.
const STAGING_CAPACITY: usize = 64 * 1024;

/// Options for the request/response server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOpts {
    /// Socket tuning for the listener's accepted connections.
    pub socket: SocketOpts,
    /// Response batching. When set, each connection gets its own batcher
    /// whose consumer serializes whole batches into a single socket
    /// write. When `None`, replies are written immediately under a
    /// per-connection mutex.
    pub batcher: Option<BatcherOpts>,
}

/// Per-connection request handler. Invoked once per parsed request with
/// `(Some(req), Some(replier))`, and exactly once with `(None, None)`
/// when the connection goes down, giving user code a cleanup hook.
///
/// Returning an error terminates the connection.
pub type RequestHandler<Req, Resp> =
    Box<dyn FnMut(Option<Req>, Option<&Replier<Resp>>) -> Result<(), Error> + Send>;

/// Sends responses on the connection a request arrived on.
///
/// Callable from any thread; the façade serializes writers internally.
pub struct Replier<Resp> {
    inner: ReplierInner<Resp>,
}

enum ReplierInner<Resp> {
    /// Immediate writes under a mutex.
    Direct(Mutex<DirectWriter<Resp>>),
    /// Enqueue into the per-connection batcher; its consumer is the only
    /// writer to the socket.
    Batched(Batcher<Resp>),
}

struct DirectWriter<Resp> {
    stream: TcpStream,
    staging: ByteBuffer,
    write: WriteFn<Resp>,
}

impl<Resp: Send + 'static> Replier<Resp> {
    fn new(
        stream: TcpStream,
        write: WriteFn<Resp>,
        batcher_opts: Option<BatcherOpts>,
    ) -> Result<Self, Error> {
        let inner = match batcher_opts {
            Some(opts) => {
                let mut stream = stream;
                let mut staging = ByteBuffer::new(Endian::Big, STAGING_CAPACITY);
                let mut write = write;
                // The batcher's consumer thread is the sole writer, so the
                // staging buffer needs no lock.
                let batcher = Batcher::new(opts, move |resps: &mut Vec<Resp>| {
                    staging.reset();
                    for resp in resps.iter() {
                        write(&mut staging, resp)?;
                    }
                    tcp::send_all(&mut stream, staging.written_slice())
                })?;
                ReplierInner::Batched(batcher)
            }
            None => ReplierInner::Direct(Mutex::new(DirectWriter {
                stream,
                staging: ByteBuffer::new(Endian::Big, STAGING_CAPACITY),
                write,
            })),
        };
        Ok(Replier { inner })
    }

    /// Send one response on the originating connection.
    ///
    /// In batched mode the response is delivered within the batcher's
    /// flush window; in direct mode it is on the wire when this returns.
    pub fn send(&self, resp: Resp) -> Result<(), Error> {
        match &self.inner {
            ReplierInner::Direct(writer) => {
                let mut guard = writer.lock().unwrap_or_else(PoisonError::into_inner);
                let w = &mut *guard;
                w.staging.reset();
                (w.write)(&mut w.staging, &resp)?;
                tcp::send_all(&mut w.stream, w.staging.written_slice())
            }
            ReplierInner::Batched(batcher) => {
                batcher.add(resp);
                Ok(())
            }
        }
    }

    /// Flush and stop the response batcher, if any.
    fn close(&mut self) {
        if let ReplierInner::Batched(batcher) = &mut self.inner {
            batcher.close();
        }
    }
}

/// Typed request/response server.
///
/// Generic over the request and response types; the codec factory is
/// invoked once per connection, so codecs that keep per-connection
/// framing state simply close over it.
pub struct Server<Req, Resp> {
    tcp: TcpServer,
    _marker: PhantomData<fn(Req, Resp)>,
}

impl<Req, Resp> Server<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Bind `port` (0 = OS-chosen) and serve.
    ///
    /// `new_handler` is invoked once per connection to create that
    /// connection's request handler; `new_codec` likewise yields the
    /// connection's `(parse, write)` pair.
    pub fn new<H, C>(
        port: u16,
        opts: ServerOpts,
        new_handler: H,
        new_codec: C,
    ) -> Result<Self, Error>
    where
        H: Fn() -> RequestHandler<Req, Resp> + Send + Sync + 'static,
        C: Fn() -> (ParseFn<Req>, WriteFn<Resp>) + Send + Sync + 'static,
    {
        if let Some(batcher) = &opts.batcher {
            batcher.validate()?;
        }
        let batcher_opts = opts.batcher;

        let tcp_factory: Arc<NewConnHandler> = Arc::new(move |stream: TcpStream| {
            let (mut parse, write) = new_codec();
            let mut user_handler = new_handler();
            let mut replier = match Replier::new(stream, write, batcher_opts) {
                Ok(replier) => replier,
                Err(err) => {
                    error!("failed to set up connection write path: {err}");
                    // Surface the error on the first read so the runtime
                    // drops the connection through its normal teardown.
                    let mut setup_err = Some(err);
                    let fallback: ConnHandler =
                        Box::new(move |_buf: Option<&mut ByteBuffer>| match setup_err.take() {
                            Some(err) => Err(err),
                            None => Ok(()),
                        });
                    return fallback;
                }
            };

            let handler: ConnHandler = Box::new(move |buf: Option<&mut ByteBuffer>| {
                let Some(buf) = buf else {
                    let result = user_handler(None, None);
                    replier.close();
                    return result;
                };
                for req in parse_all(buf, &mut *parse)? {
                    user_handler(Some(req), Some(&replier))?;
                }
                Ok(())
            });
            handler
        });

        let tcp = TcpServer::new(port, opts.socket, tcp_factory)?;
        Ok(Server {
            tcp,
            _marker: PhantomData,
        })
    }

    /// The port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.tcp.port()
    }

    /// Number of currently live connections.
    pub fn active_connections(&self) -> usize {
        self.tcp.active_connections()
    }

    /// Stop accepting and tear down live connections; each connection's
    /// handler observes its `(None, None)` close call. Idempotent.
    pub fn close(&mut self) {
        self.tcp.close();
    }
}
