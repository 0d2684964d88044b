use std::marker::PhantomData;
use std::sync::{Mutex, PoisonError};

use crate::buffer::{ByteBuffer, Endian};
use crate::client::TcpClient;
use crate::codec::{ParseFn, WriteFn, parse_all};
use crate::config::SocketOpts;
use crate::error::Error;
use crate::tcp::ConnHandler;

/// Initial capacity of the request staging buffer.
const STAGING_CAPACITY: usize = 64 * 1024;

/// Why the response handler was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// A response was parsed off the wire.
    Ok,
    /// The server closed the connection; no response accompanies this
    /// call and no further calls follow.
    Disconnected,
}

/// Handler for inbound responses. Invoked with `(Some(resp), Ok)` per
/// response, in wire order, on the client's read thread; invoked exactly
/// once with `(None, Disconnected)` when the connection goes down.
pub type ResponseHandler<Resp> =
    Box<dyn FnMut(Option<Resp>, ClientStatus) -> Result<(), Error> + Send>;

/// Typed request/response client.
///
/// Sends serialize into a staging buffer under a mutex, so `send` is
/// safe from any thread; responses arrive asynchronously through the
/// response handler.
pub struct Client<Req, Resp> {
    tcp: TcpClient,
    writer: Mutex<ClientWriter<Req>>,
    _marker: PhantomData<fn(Resp)>,
}

struct ClientWriter<Req> {
    staging: ByteBuffer,
    write: WriteFn<Req>,
}

impl<Req, Resp> Client<Req, Resp>
where
    Req: 'static,
    Resp: Send + 'static,
{
    /// Connect to `ip:port`. `new_codec` yields this connection's
    /// `(write, parse)` pair; `resp_handler` observes every response.
    pub fn new<C>(
        ip: &str,
        port: u16,
        opts: SocketOpts,
        mut resp_handler: ResponseHandler<Resp>,
        new_codec: C,
    ) -> Result<Self, Error>
    where
        C: FnOnce() -> (WriteFn<Req>, ParseFn<Resp>),
    {
        let (write, mut parse) = new_codec();

        let tcp_handler: ConnHandler = Box::new(move |buf: Option<&mut ByteBuffer>| {
            let Some(buf) = buf else {
                return resp_handler(None, ClientStatus::Disconnected);
            };
            for resp in parse_all(buf, &mut *parse)? {
                resp_handler(Some(resp), ClientStatus::Ok)?;
            }
            Ok(())
        });

        let tcp = TcpClient::new(ip, port, opts, tcp_handler)?;
        Ok(Client {
            tcp,
            writer: Mutex::new(ClientWriter {
                staging: ByteBuffer::new(Endian::Big, STAGING_CAPACITY),
                write,
            }),
            _marker: PhantomData,
        })
    }

    /// Serialize and send one request.
    pub fn send(&self, req: &Req) -> Result<(), Error> {
        let mut guard = self.lock_writer();
        let w = &mut *guard;
        w.staging.reset();
        (w.write)(&mut w.staging, req)?;
        self.tcp.send_bytes(w.staging.written_slice())
    }

    /// Serialize and send a batch of requests with one lock acquisition
    /// and one socket write.
    pub fn send_batch<'a, I>(&self, reqs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a Req>,
        Req: 'a,
    {
        let mut guard = self.lock_writer();
        let w = &mut *guard;
        Self::write_batch(w, &self.tcp, reqs)
    }

    /// [`Client::send_batch`] without the lock, for callers that can
    /// prove exclusive access by holding `&mut self`.
    pub fn send_batch_mut<'a, I>(&mut self, reqs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a Req>,
        Req: 'a,
    {
        let Client { tcp, writer, .. } = self;
        let w = writer.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::write_batch(w, tcp, reqs)
    }

    fn write_batch<'a, I>(w: &mut ClientWriter<Req>, tcp: &TcpClient, reqs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a Req>,
        Req: 'a,
    {
        w.staging.reset();
        for req in reqs {
            (w.write)(&mut w.staging, req)?;
        }
        tcp.send_bytes(w.staging.written_slice())
    }

    /// Shut the connection down; the response handler receives its
    /// `Disconnected` call before this returns. Idempotent.
    pub fn close(&mut self) {
        self.tcp.close();
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ClientWriter<Req>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
