//! Endian-typed growable byte buffer with a random-access read cursor.
//!
//! [`ByteBuffer`] backs both sides of the socket path: connection read
//! loops fill its spare window directly from the socket, codecs consume
//! framed messages through the read cursor, and write paths stage one or
//! more encoded messages before a single `send_all`.
//!
//! The backing storage is kept fully initialized out to its allocated
//! length so the spare window `[write_len..capacity)` can be handed to
//! `Read::read` as a plain `&mut [u8]`.

use std::io::{self, Read, Write};

use crate::error::Error;

/// Byte order applied by the typed integer accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Network byte order.
    Big,
    /// Host order on x86/ARM.
    Little,
}

/// Contiguous octet store with three offsets: `write_len` (end of valid
/// data), `read_pos` (consumer cursor), and `mark` (saved cursor for
/// rollback). Invariant: `read_pos <= write_len <= capacity` and
/// `mark <= write_len`.
///
/// Not thread-safe; every buffer is owned by exactly one task.
pub struct ByteBuffer {
    endian: Endian,
    data: Vec<u8>,
    write_len: usize,
    read_pos: usize,
    mark: usize,
}

impl ByteBuffer {
    /// Create a buffer with the given byte order and initial capacity.
    pub fn new(endian: Endian, capacity: usize) -> Self {
        ByteBuffer {
            endian,
            data: vec![0; capacity],
            write_len: 0,
            read_pos: 0,
            mark: 0,
        }
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes, `[0..write_len)`.
    pub fn written(&self) -> usize {
        self.write_len
    }

    /// Number of unread bytes, `write_len - read_pos`.
    pub fn readable(&self) -> usize {
        self.write_len - self.read_pos
    }

    /// Whether `n` bytes can be read without running past the end.
    pub fn can_read(&self, n: usize) -> bool {
        self.readable() >= n
    }

    // ── Writers ──────────────────────────────────────────────────────

    /// Append raw bytes, growing capacity if needed.
    pub fn write_bytes(&mut self, val: &[u8]) {
        self.ensure_spare_capacity(val.len());
        self.data[self.write_len..self.write_len + val.len()].copy_from_slice(val);
        self.write_len += val.len();
    }

    /// Append the UTF-8 bytes of a string.
    pub fn write_str(&mut self, val: &str) {
        self.write_bytes(val.as_bytes());
    }

    /// Append a single unsigned byte.
    pub fn write_u8(&mut self, val: u8) {
        self.write_bytes(&[val]);
    }

    /// Append a single signed byte.
    pub fn write_i8(&mut self, val: i8) {
        self.write_bytes(&[val as u8]);
    }

    /// Append a 16-bit integer in the buffer's byte order.
    pub fn write_i16(&mut self, val: i16) {
        match self.endian {
            Endian::Big => self.write_bytes(&val.to_be_bytes()),
            Endian::Little => self.write_bytes(&val.to_le_bytes()),
        }
    }

    /// Append a 32-bit integer in the buffer's byte order.
    pub fn write_i32(&mut self, val: i32) {
        match self.endian {
            Endian::Big => self.write_bytes(&val.to_be_bytes()),
            Endian::Little => self.write_bytes(&val.to_le_bytes()),
        }
    }

    /// Append a 64-bit integer in the buffer's byte order.
    pub fn write_i64(&mut self, val: i64) {
        match self.endian {
            Endian::Big => self.write_bytes(&val.to_be_bytes()),
            Endian::Little => self.write_bytes(&val.to_le_bytes()),
        }
    }

    // ── Readers ──────────────────────────────────────────────────────
    //
    // Each reader fails with `InsufficientData` and leaves `read_pos`
    // untouched when fewer than the required bytes are readable.

    fn take<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        if !self.can_read(N) {
            return Err(Error::InsufficientData {
                needed: N,
                available: self.readable(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.read_pos..self.read_pos + N]);
        self.read_pos += N;
        Ok(out)
    }

    /// Read one unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take::<1>()?[0])
    }

    /// Read one signed byte. Bit-preserving from the unsigned encoding.
    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.take::<1>()?[0] as i8)
    }

    /// Read a 16-bit integer in the buffer's byte order.
    pub fn read_i16(&mut self) -> Result<i16, Error> {
        let bytes = self.take::<2>()?;
        Ok(match self.endian {
            Endian::Big => i16::from_be_bytes(bytes),
            Endian::Little => i16::from_le_bytes(bytes),
        })
    }

    /// Read a 32-bit integer in the buffer's byte order.
    pub fn read_i32(&mut self) -> Result<i32, Error> {
        let bytes = self.take::<4>()?;
        Ok(match self.endian {
            Endian::Big => i32::from_be_bytes(bytes),
            Endian::Little => i32::from_le_bytes(bytes),
        })
    }

    /// Read a 64-bit integer in the buffer's byte order.
    pub fn read_i64(&mut self) -> Result<i64, Error> {
        let bytes = self.take::<8>()?;
        Ok(match self.endian {
            Endian::Big => i64::from_be_bytes(bytes),
            Endian::Little => i64::from_le_bytes(bytes),
        })
    }

    /// Read `n` bytes as an owned copy.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        if !self.can_read(n) {
            return Err(Error::InsufficientData {
                needed: n,
                available: self.readable(),
            });
        }
        let out = self.data[self.read_pos..self.read_pos + n].to_vec();
        self.read_pos += n;
        Ok(out)
    }

    /// Read exactly `dst.len()` bytes into `dst`.
    pub fn read_bytes_into(&mut self, dst: &mut [u8]) -> Result<(), Error> {
        if !self.can_read(dst.len()) {
            return Err(Error::InsufficientData {
                needed: dst.len(),
                available: self.readable(),
            });
        }
        dst.copy_from_slice(&self.data[self.read_pos..self.read_pos + dst.len()]);
        self.read_pos += dst.len();
        Ok(())
    }

    /// Read `n` bytes as a UTF-8 string.
    pub fn read_string(&mut self, n: usize) -> Result<String, Error> {
        let bytes = self.read_bytes(n)?;
        String::from_utf8(bytes).map_err(|err| Error::CorruptStream(format!("invalid UTF-8: {err}")))
    }

    /// Drain all unread bytes into an owned copy.
    pub fn read_all(&mut self) -> Vec<u8> {
        let out = self.data[self.read_pos..self.write_len].to_vec();
        self.read_pos = self.write_len;
        out
    }

    // ── Cursor management ────────────────────────────────────────────

    /// Current read cursor.
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Set the read cursor to an absolute position.
    ///
    /// # Panics
    ///
    /// Panics when `pos > written()`.
    pub fn set_read_pos(&mut self, pos: usize) {
        assert!(
            pos <= self.write_len,
            "read pos {pos} out of range (written: {})",
            self.write_len
        );
        self.read_pos = pos;
    }

    /// Advance the read cursor by `delta` bytes.
    pub fn advance_read_pos(&mut self, delta: usize) {
        self.set_read_pos(self.read_pos + delta);
    }

    /// Save the current read cursor for a later rollback.
    pub fn mark_read_pos(&mut self) {
        self.mark = self.read_pos;
    }

    /// Roll the read cursor back to the saved mark.
    pub fn reset_read_pos_to_mark(&mut self) {
        self.read_pos = self.mark;
    }

    /// Shift the unread bytes `[read_pos..write_len)` to offset 0 and
    /// rebase the cursor and mark. Frees no memory; keeps capacity.
    pub fn discard_read_bytes(&mut self) {
        let n = self.read_pos;
        if n == 0 {
            return;
        }
        self.data.copy_within(n..self.write_len, 0);
        self.write_len -= n;
        self.read_pos = 0;
        self.mark = self.mark.saturating_sub(n);
    }

    /// Forget all contents. Keeps capacity.
    pub fn reset(&mut self) {
        self.write_len = 0;
        self.read_pos = 0;
        self.mark = 0;
    }

    // ── Zero-copy staging for the socket layer ───────────────────────

    /// Guarantee at least `n` bytes of spare capacity past `write_len`.
    /// Growth preserves all valid bytes and all three offsets.
    pub fn ensure_spare_capacity(&mut self, n: usize) {
        let needed = self.write_len + n;
        if needed > self.data.len() {
            let new_len = needed.max(self.data.len() * 2);
            self.data.resize(new_len, 0);
        }
    }

    /// The spare window `[write_len..capacity)`, for direct socket reads.
    pub fn writable_spare(&mut self) -> &mut [u8] {
        &mut self.data[self.write_len..]
    }

    /// Commit `n` bytes previously written into the spare window.
    ///
    /// # Panics
    ///
    /// Panics when `n` exceeds the spare capacity.
    pub fn add_written(&mut self, n: usize) {
        assert!(
            self.write_len + n <= self.data.len(),
            "add_written({n}) exceeds spare capacity {}",
            self.data.len() - self.write_len
        );
        self.write_len += n;
    }

    /// The unread window `[read_pos..write_len)`.
    pub fn readable_slice(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_len]
    }

    /// All valid bytes `[0..write_len)`, regardless of the read cursor.
    /// Staged write paths hand this to `send_all`.
    pub fn written_slice(&self) -> &[u8] {
        &self.data[..self.write_len]
    }
}

impl Read for ByteBuffer {
    /// Reads drain the unread window. Returns `Ok(0)` at end of input.
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = self.readable().min(out.len());
        out[..n].copy_from_slice(&self.data[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        Ok(n)
    }
}

impl Write for ByteBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write_bytes(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("endian", &self.endian)
            .field("capacity", &self.data.len())
            .field("write_len", &self.write_len)
            .field("read_pos", &self.read_pos)
            .field("mark", &self.mark)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_width_big_endian_round_trip() {
        let mut buf = ByteBuffer::new(Endian::Big, 10);
        buf.write_i16(0x1234);
        buf.write_i32(0x12345678);

        assert_eq!(buf.written_slice(), &[0x12, 0x34, 0x12, 0x34, 0x56, 0x78]);
        assert_eq!(buf.read_i16().unwrap(), 0x1234);
        assert_eq!(buf.read_i32().unwrap(), 0x12345678);
        assert_eq!(buf.readable(), 0);
    }

    #[test]
    fn little_endian_round_trip() {
        let mut buf = ByteBuffer::new(Endian::Little, 16);
        buf.write_i16(0x1234);
        buf.write_i64(-7);
        assert_eq!(buf.written_slice()[..2], [0x34, 0x12]);
        assert_eq!(buf.read_i16().unwrap(), 0x1234);
        assert_eq!(buf.read_i64().unwrap(), -7);
    }

    #[test]
    fn unsigned_to_signed_is_bit_preserving() {
        let mut buf = ByteBuffer::new(Endian::Big, 4);
        buf.write_u8(0xFF);
        buf.write_u8(0x80);
        assert_eq!(buf.read_i8().unwrap(), -1);
        assert_eq!(buf.read_i8().unwrap(), i8::MIN);
    }

    #[test]
    fn insufficient_data_leaves_read_pos() {
        let mut buf = ByteBuffer::new(Endian::Big, 8);
        buf.write_i16(42);
        buf.advance_read_pos(1);
        let err = buf.read_i32().unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientData {
                needed: 4,
                available: 1
            }
        ));
        assert_eq!(buf.read_pos(), 1);
    }

    #[test]
    fn grow_preserves_contents_and_offsets() {
        let mut buf = ByteBuffer::new(Endian::Big, 4);
        buf.write_i32(0x01020304);
        buf.advance_read_pos(1);
        buf.mark_read_pos();
        buf.advance_read_pos(1);

        let before = buf.written_slice().to_vec();
        buf.ensure_spare_capacity(1024);

        assert_eq!(buf.written_slice(), &before[..]);
        assert_eq!(buf.read_pos(), 2);
        assert_eq!(buf.written(), 4);
        buf.reset_read_pos_to_mark();
        assert_eq!(buf.read_pos(), 1);
        assert!(buf.capacity() >= 4 + 1024);
    }

    #[test]
    fn discard_read_bytes_shifts_and_rebases() {
        let mut buf = ByteBuffer::new(Endian::Big, 16);
        buf.write_bytes(b"abcdef");
        buf.advance_read_pos(2);

        buf.discard_read_bytes();
        assert_eq!(buf.read_pos(), 0);
        assert_eq!(buf.written(), 4);
        assert_eq!(buf.readable_slice(), b"cdef");
    }

    #[test]
    fn discard_adjusts_mark() {
        let mut buf = ByteBuffer::new(Endian::Big, 16);
        buf.write_bytes(b"abcdef");
        buf.advance_read_pos(2);
        buf.advance_read_pos(2);
        buf.mark_read_pos();
        buf.set_read_pos(2);

        // mark (4) rebases by -read_pos (2)
        buf.discard_read_bytes();
        buf.reset_read_pos_to_mark();
        assert_eq!(buf.read_pos(), 2);
        assert_eq!(buf.readable_slice(), b"ef");
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut buf = ByteBuffer::new(Endian::Big, 8);
        buf.write_bytes(b"12345678");
        let cap = buf.capacity();
        buf.reset();
        assert_eq!(buf.written(), 0);
        assert_eq!(buf.read_pos(), 0);
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn set_read_pos_past_written_panics() {
        let mut buf = ByteBuffer::new(Endian::Big, 8);
        buf.write_u8(1);
        buf.set_read_pos(2);
    }

    #[test]
    fn spare_window_commit() {
        let mut buf = ByteBuffer::new(Endian::Big, 4);
        buf.write_bytes(b"ab");
        buf.ensure_spare_capacity(3);
        buf.writable_spare()[..3].copy_from_slice(b"cde");
        buf.add_written(3);
        assert_eq!(buf.readable_slice(), b"abcde");
    }

    #[test]
    fn strings_and_byte_reads() {
        let mut buf = ByteBuffer::new(Endian::Big, 16);
        buf.write_str("hello");
        buf.write_bytes(b"xy");

        assert_eq!(buf.read_string(5).unwrap(), "hello");
        let mut two = [0u8; 2];
        buf.read_bytes_into(&mut two).unwrap();
        assert_eq!(&two, b"xy");
        assert_eq!(buf.readable(), 0);
    }

    #[test]
    fn io_read_write_conformance() {
        use std::io::{Read, Write};

        let mut buf = ByteBuffer::new(Endian::Big, 4);
        buf.write_all(b"roundtrip").unwrap();

        let mut first = [0u8; 5];
        buf.read_exact(&mut first).unwrap();
        assert_eq!(&first, b"round");

        let mut rest = Vec::new();
        buf.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"trip");

        // Empty buffer reads as end of input.
        let mut probe = [0u8; 1];
        assert_eq!(buf.read(&mut probe).unwrap(), 0);
    }

    #[test]
    fn read_all_drains() {
        let mut buf = ByteBuffer::new(Endian::Big, 8);
        buf.write_bytes(b"abc");
        buf.advance_read_pos(1);
        assert_eq!(buf.read_all(), b"bc");
        assert_eq!(buf.readable(), 0);
    }
}
