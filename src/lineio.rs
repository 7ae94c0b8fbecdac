//! Line-oriented and bulk byte I/O primitives shared by the client and
//! server session engines.
//!
//! The control channel is text, one message per line; the data channel is
//! an undifferentiated byte stream. Both primitives here are built on plain
//! `Read`/`Write` so they work the same way over a `TcpStream` or, in
//! tests, over an in-memory pipe.
#![deny(missing_docs)]
use std::io::{self, prelude::*};

/// Maximum length of a single control line, including the terminating `\n`.
///
/// Implementations must treat a longer line as a protocol error rather than
/// silently truncating it into something that happens to parse.
pub const MAX_LINE: usize = 8192;

/// Buffer size used when streaming bulk payloads on the data channel.
pub const STREAM_BUF: usize = 8192;

/// Read one line from `src`, stopping at (and consuming) a trailing `\n`.
///
/// Reads one byte at a time so that no bytes past the line's terminator are
/// ever consumed from `src` - the next read (by this function or anything
/// else) starts exactly where the next message begins. This matters because
/// the data channel handshake hands the same socket over to very different
/// code right after a control line is read.
///
/// Returns the number of bytes placed in `buf` (the newline itself is not
/// included). A return value of `0` means the source reached EOF before any
/// byte was read at all - the distinguished EOF response in the wire
/// protocol. Lines longer than `buf.len()` are a protocol error.
pub fn read_line<R: Read>(src: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    buf.clear();
    let mut byte = [0u8; 1];
    loop {
        let n = src.read(&mut byte)?;
        if n == 0 {
            // EOF. If we already have bytes, the peer disappeared mid-line;
            // that's still reported as EOF to the caller, which treats any
            // EOF as the distinguished EOF response.
            return Ok(buf.len());
        }
        if byte[0] == b'\n' {
            return Ok(buf.len());
        }
        if buf.len() + 1 >= MAX_LINE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("control line exceeds MAX_LINE ({MAX_LINE} bytes)"),
            ));
        }
        buf.push(byte[0]);
    }
}

/// Write `line` to `dst` followed by a single `\n`, looping until the whole
/// buffer (plus terminator) is flushed.
///
/// `line` must not contain an embedded `\n`; callers are responsible for
/// that invariant since this is a raw I/O primitive, not a framing layer.
pub fn write_line<W: Write>(dst: &mut W, line: &[u8]) -> io::Result<()> {
    debug_assert!(!line.contains(&b'\n'), "line must not contain a newline");
    dst.write_all(line)?;
    dst.write_all(b"\n")?;
    dst.flush()
}

/// Copy all bytes from `src` to `dst` until `src` reaches EOF.
///
/// Reads happen in blocks of up to [`STREAM_BUF`] bytes; each block is
/// written out in full (looping through partial writes) before the next
/// read. Returns the total number of bytes copied.
pub fn stream_copy<R: Read, W: Write>(src: &mut R, dst: &mut W) -> io::Result<u64> {
    let mut buf = vec![0u8; STREAM_BUF];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        dst.write_all(&buf[..n])?;
        total += n as u64;
    }
}
