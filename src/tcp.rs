//! Shared TCP plumbing: short-write-safe send, buffer-filling reads,
//! socket tuning, and the per-connection read loop driven by both the
//! server and the client.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};

use log::{debug, warn};

use crate::buffer::{ByteBuffer, Endian};
use crate::config::{Optimization, SocketOpts};
use crate::error::Error;
use crate::metrics;

/// Handler invoked by a connection read loop after every successful
/// read, with the accumulated buffer. Invoked once with `None` when the
/// connection goes down (peer EOF, read error, or handler error).
pub type ConnHandler = Box<dyn FnMut(Option<&mut ByteBuffer>) -> Result<(), Error> + Send>;

/// Write all of `data`, looping over short writes.
pub fn send_all<W: Write>(writer: &mut W, data: &[u8]) -> Result<(), Error> {
    let mut remaining = data;
    while !remaining.is_empty() {
        match writer.write(remaining) {
            Ok(0) => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket write returned zero bytes",
                )));
            }
            Ok(n) => remaining = &remaining[n..],
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::Io(err)),
        }
    }
    metrics::BYTES_SENT.add(data.len() as u64);
    Ok(())
}

/// Grow `buf`'s spare window to at least `min_spare` bytes, perform one
/// read into it, and commit the bytes read. Returns the number of bytes
/// read, or [`Error::EndOfInput`] on a zero-length read.
pub fn read_to_buffer<R: Read>(
    min_spare: usize,
    reader: &mut R,
    buf: &mut ByteBuffer,
) -> Result<usize, Error> {
    buf.ensure_spare_capacity(min_spare);
    loop {
        match reader.read(buf.writable_spare()) {
            Ok(0) => return Err(Error::EndOfInput),
            Ok(n) => {
                buf.add_written(n);
                metrics::BYTES_RECEIVED.add(n as u64);
                return Ok(n);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::Io(err)),
        }
    }
}

/// Apply the socket tuning knobs to a connected stream.
///
/// Failures are logged and tolerated; a socket without its preferred
/// window sizes still works.
pub(crate) fn tune_stream(stream: &TcpStream, opts: &SocketOpts) {
    let nodelay = opts.optimization == Optimization::Latency;
    if let Err(err) = stream.set_nodelay(nodelay) {
        warn!("failed to set TCP_NODELAY={nodelay}: {err}, proceeding anyway");
    }
    if opts.tcp_read_window_size > 0 {
        set_sockopt_int(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            opts.tcp_read_window_size,
            "SO_RCVBUF",
        );
    }
    if opts.tcp_write_window_size > 0 {
        set_sockopt_int(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            opts.tcp_write_window_size,
            "SO_SNDBUF",
        );
    }
}

fn set_sockopt_int(fd: RawFd, level: libc::c_int, name: libc::c_int, value: usize, label: &str) {
    let optval = value as libc::c_int;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        let err = io::Error::last_os_error();
        warn!("failed to set {label}={value}: {err}, proceeding anyway");
    }
}

/// Per-connection read loop shared by the server and the client.
///
/// Owns the read buffer; keeps at least `read_buf_size / 5` bytes of
/// spare capacity before each read; invokes the handler with the
/// accumulated buffer after every read and compacts consumed bytes
/// afterwards. Delivers the `None` close signal exactly once on the way
/// out, then shuts the socket down.
pub(crate) fn conn_read_loop(mut stream: TcpStream, read_buf_size: usize, mut handler: ConnHandler) {
    crate::counter::register_thread(crate::counter::ThreadRole::Connection);
    let mut buf = ByteBuffer::new(Endian::Big, read_buf_size);
    // A zero-byte read into a full buffer would be indistinguishable
    // from EOF, so the spare guarantee never drops below one byte.
    let min_spare = (read_buf_size / 5).max(1);

    loop {
        match read_to_buffer(min_spare, &mut stream, &mut buf) {
            Ok(_) => {}
            Err(Error::EndOfInput) => {
                debug!("connection closed by peer");
                break;
            }
            Err(err) => {
                warn!("connection read error: {err}");
                break;
            }
        }
        if let Err(err) = handler(Some(&mut buf)) {
            warn!("connection handler error: {err}");
            break;
        }
        buf.discard_read_bytes();
    }

    if let Err(err) = handler(None) {
        warn!("connection close handler error: {err}");
    }
    let _ = stream.shutdown(std::net::Shutdown::Both);
}
