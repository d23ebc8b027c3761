//! Self-describing frame codec
//!
//! Every message travels as one frame:
//!
//! ```text
//! [magic: 4 bytes][fmt_len: u32][fmt: ASCII][payload_len: u32][payload]
//! ```
//!
//! All integers are little-endian and fixed-width. The format string names
//! the payload layout with the schema letters (`i` signed 32-bit, `c`
//! signed byte, `#` counted array at declared capacity, `S(...)` record,
//! `$(...)` nested record); readers validate it byte-for-byte against the
//! schema they expect before touching the payload, and then consume the
//! payload exactly. Any mismatch, short read, or leftover byte is fatal
//! for the connection.

use crate::error::{Result, WireError};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Write};

/// Magic tag identifying the codec, first bytes of every frame.
pub const MAGIC: [u8; 4] = *b"uwf1";

/// Upper bound on a declared payload length.
///
/// The largest catalog payload is the device list (just over 2 KiB); the
/// cap only has to stop a corrupt header from triggering a huge
/// allocation.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Upper bound on a declared format string length.
pub const MAX_FORMAT_LEN: usize = 256;

/// A record with a fixed wire schema.
///
/// `FORMAT` is the format string transmitted in (and validated against)
/// the frame header; `encode`/`decode` must produce and consume exactly
/// the bytes that schema describes.
pub trait WireRecord: Sized {
    const FORMAT: &'static str;

    fn encode(&self, w: &mut PayloadWriter);
    fn decode(r: &mut PayloadReader) -> Result<Self>;
}

/// Accumulates a payload in the canonical encoding.
#[derive(Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    /// Open a counted array by writing its capacity count.
    pub fn begin_array(&mut self, capacity: usize) {
        self.put_i32(capacity as i32);
    }

    /// Append raw array bytes (the caller writes the full capacity).
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.buf
    }
}

/// Consumes a payload, tracking position for exact-length decoding.
pub struct PayloadReader {
    buf: Vec<u8>,
    pos: usize,
}

impl PayloadReader {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            buf: payload,
            pos: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.remaining() < n {
            return Err(WireError::PayloadExhausted {
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        let mut bytes = self.take(4)?;
        Ok(bytes.read_i32::<LittleEndian>()?)
    }

    pub fn get_i8(&mut self) -> Result<i8> {
        let mut bytes = self.take(1)?;
        Ok(bytes.read_i8()?)
    }

    /// Consume a counted-array header and require the declared capacity.
    pub fn expect_array(&mut self, capacity: usize) -> Result<()> {
        let count = self.get_i32()?;
        if count != capacity as i32 {
            return Err(WireError::BadArrayCount {
                expected: capacity,
                found: count,
            });
        }
        Ok(())
    }

    /// Fill `out` with the next `out.len()` raw array bytes.
    pub fn get_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        let slice = self.take(out.len())?;
        out.copy_from_slice(slice);
        Ok(())
    }

    /// Assert the payload was consumed exactly.
    pub fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(WireError::TrailingBytes {
                remaining: self.remaining(),
            });
        }
        Ok(())
    }
}

/// Write one frame: header for `fmt`, then `payload`.
///
/// The frame is assembled in memory and written with a single
/// `write_all`, so a transport error leaves no partial frame buffered on
/// this side.
pub fn write_frame<W: Write>(writer: &mut W, fmt: &str, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(12 + fmt.len() + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
    frame.extend_from_slice(fmt.as_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);

    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame, validating magic and format, returning the payload.
///
/// Advances the stream by exactly the header plus the declared payload
/// length; a peer that hangs up mid-frame surfaces as an I/O error.
pub fn read_frame<R: Read>(reader: &mut R, expected_fmt: &'static str) -> Result<Vec<u8>> {
    match read_frame_opt(reader, expected_fmt)? {
        Some(payload) => Ok(payload),
        None => Err(WireError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "stream closed before frame",
        ))),
    }
}

/// Like [`read_frame`], but a stream that is already at EOF on the first
/// byte yields `Ok(None)`. A peer hanging up *between* frames is a normal
/// end of session; hanging up *inside* a frame is still an error.
pub fn read_frame_opt<R: Read>(
    reader: &mut R,
    expected_fmt: &'static str,
) -> Result<Option<Vec<u8>>> {
    let magic = match read_magic_or_eof(reader)? {
        Some(magic) => magic,
        None => return Ok(None),
    };
    if magic != MAGIC {
        return Err(WireError::BadMagic { found: magic });
    }

    let fmt_len = read_u32(reader)? as usize;
    if fmt_len > MAX_FORMAT_LEN {
        return Err(WireError::FrameTooLarge {
            size: fmt_len,
            max: MAX_FORMAT_LEN,
        });
    }
    let mut fmt_bytes = vec![0u8; fmt_len];
    reader.read_exact(&mut fmt_bytes)?;
    if fmt_bytes != expected_fmt.as_bytes() {
        return Err(WireError::FormatMismatch {
            expected: expected_fmt,
            found: String::from_utf8_lossy(&fmt_bytes).into_owned(),
        });
    }

    let payload_len = read_u32(reader)? as usize;
    if payload_len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: payload_len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

fn read_magic_or_eof<R: Read>(reader: &mut R) -> Result<Option<[u8; 4]>> {
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        match reader.read(&mut magic[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(WireError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream closed inside frame header",
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(magic))
}

/// Encode a record into its frame payload bytes.
pub fn encode_record<T: WireRecord>(record: &T) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    record.encode(&mut w);
    w.into_payload()
}

/// Write a record as one complete frame.
pub fn write_record<W: Write, T: WireRecord>(writer: &mut W, record: &T) -> Result<()> {
    write_frame(writer, T::FORMAT, &encode_record(record))
}

/// Read one frame holding a `T`, decoding the payload exactly.
pub fn read_record<R: Read, T: WireRecord>(reader: &mut R) -> Result<T> {
    let payload = read_frame(reader, T::FORMAT)?;
    decode_payload(payload)
}

/// Like [`read_record`], but clean EOF before the frame yields `Ok(None)`.
pub fn read_record_opt<R: Read, T: WireRecord>(reader: &mut R) -> Result<Option<T>> {
    match read_frame_opt(reader, T::FORMAT)? {
        Some(payload) => Ok(Some(decode_payload(payload)?)),
        None => Ok(None),
    }
}

fn decode_payload<T: WireRecord>(payload: Vec<u8>) -> Result<T> {
    let mut r = PayloadReader::new(payload);
    let record = T::decode(&mut r)?;
    r.finish()?;
    Ok(record)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    Ok(reader.read_u32::<LittleEndian>()?)
}
