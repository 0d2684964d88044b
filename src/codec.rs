//! Framing-agnostic streaming codec contract.
//!
//! A codec is a pair of functions over a [`ByteBuffer`]: a parser that
//! consumes exactly one framed message per call, and a writer that
//! appends the full encoding of one message. Neither keeps state between
//! calls; per-connection statefulness is expressed by constructing fresh
//! instances per connection (the request/response façade does this
//! through a codec factory).
//!
//! Parser contract:
//! - `Ok(Parsed::Complete(v))` — the read cursor advanced past exactly
//!   one frame.
//! - `Ok(Parsed::Incomplete)` — not enough bytes yet; the read cursor is
//!   restored to its value at entry.
//! - `Err(_)` — the stream is corrupt and cannot be resynchronized.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::buffer::ByteBuffer;
use crate::error::Error;

/// Result of one parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed<T> {
    /// One complete frame was decoded and consumed.
    Complete(T),
    /// More bytes are needed; nothing was consumed.
    Incomplete,
}

/// Streaming parser for one framed message type.
pub type ParseFn<T> = Box<dyn FnMut(&mut ByteBuffer) -> Result<Parsed<T>, Error> + Send>;

/// Writer appending the full encoding of one message.
pub type WriteFn<T> = Box<dyn FnMut(&mut ByteBuffer, &T) -> Result<(), Error> + Send>;

/// A parse/write pair for one message type.
pub struct Codec<T> {
    /// Streaming decoder.
    pub parse: ParseFn<T>,
    /// Encoder.
    pub write: WriteFn<T>,
}

/// Parse every complete frame currently in `buf`.
///
/// Loops the parser until it reports `Incomplete`, then restores the
/// read cursor to the start of the partial frame and compacts the buffer
/// with `discard_read_bytes` so the caller can keep accumulating socket
/// reads. A parse error maps to [`Error::CorruptStream`]; the caller is
/// expected to drop the connection.
pub fn parse_all<T, P>(buf: &mut ByteBuffer, parse: &mut P) -> Result<Vec<T>, Error>
where
    P: FnMut(&mut ByteBuffer) -> Result<Parsed<T>, Error> + ?Sized,
{
    let mut out = Vec::new();
    loop {
        let entry_pos = buf.read_pos();
        match parse(buf) {
            Ok(Parsed::Complete(value)) => out.push(value),
            Ok(Parsed::Incomplete) => {
                buf.set_read_pos(entry_pos);
                buf.discard_read_bytes();
                return Ok(out);
            }
            Err(err) => {
                return Err(Error::CorruptStream(format!(
                    "failed to parse, stream corrupt: {err}"
                )));
            }
        }
    }
}

/// Codec for bare 32-bit integers: four bytes per frame, in the buffer's
/// byte order (the runtime constructs big-endian buffers).
pub fn int32_codec() -> Codec<i32> {
    Codec {
        parse: Box::new(|buf| {
            if !buf.can_read(4) {
                return Ok(Parsed::Incomplete);
            }
            Ok(Parsed::Complete(buf.read_i32()?))
        }),
        write: Box::new(|buf, value| {
            buf.write_i32(*value);
            Ok(())
        }),
    }
}

/// Codec for newline-delimited JSON: one document per frame, terminated
/// by `0x0A`. Documents must not contain raw newlines.
pub fn json_lines_codec<T>() -> Codec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    Codec {
        parse: Box::new(|buf| {
            let (value, frame_len) = {
                let data = buf.readable_slice();
                let Some(end) = data.iter().position(|&b| b == b'\n') else {
                    return Ok(Parsed::Incomplete);
                };
                let value = serde_json::from_slice(&data[..end]).map_err(|err| {
                    Error::CorruptStream(format!("invalid JSON document: {err}"))
                })?;
                (value, end + 1)
            };
            buf.advance_read_pos(frame_len);
            Ok(Parsed::Complete(value))
        }),
        write: Box::new(|buf, value| {
            let bytes = serde_json::to_vec(value)
                .map_err(|err| Error::CorruptStream(format!("failed to encode JSON: {err}")))?;
            buf.write_bytes(&bytes);
            buf.write_u8(b'\n');
            Ok(())
        }),
    }
}
