//! The [`ByteSource`] abstraction and its backends.
//!
//! Grounded in the original's `IOHandler` (referenced throughout
//! `Demuxer.h` as `m_handler`): a small seek/read/tell/size surface that
//! every demuxer drives without caring whether the bytes come from a file,
//! an HTTP range server, or an in-memory buffer.

mod file;
mod http;
mod memory;

pub use file::FileByteSource;
#[cfg(feature = "http")]
pub use http::HttpByteSource;
pub use memory::MemoryByteSource;

use crate::error::{DemuxError, DemuxResult, ErrorKind};

/// Where a [`ByteSource::seek`] measures its offset from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

/// A seekable, byte-oriented input channel.
///
/// Offsets are 64-bit and unsigned; positions must be monotonic under
/// `read` (a `read` never reports a smaller position than the previous
/// `tell()` plus the previous `read`'s return value). `seek` past the end
/// is permitted; a subsequent `read` at that position returns `Ok(0)`.
pub trait ByteSource: Send {
    /// Reads into `buf`, returning the number of bytes read. `Ok(0)` with
    /// no error means EOF. Partial reads are permitted.
    fn read(&mut self, buf: &mut [u8]) -> DemuxResult<usize>;

    /// Moves the read cursor. Fails with [`ErrorKind::Validation`] on a
    /// negative absolute position.
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> DemuxResult<u64>;

    /// Current cursor position.
    fn tell(&mut self) -> DemuxResult<u64>;

    /// Total size in bytes, if known (HTTP streaming without a
    /// `Content-Length` reports `None`).
    fn size(&self) -> Option<u64>;

    /// Releases any underlying resource. Idempotent; every operation after
    /// `close` fails with [`ErrorKind::Closed`].
    fn close(&mut self);

    /// Reads exactly `buf.len()` bytes, failing with [`ErrorKind::Io`] on
    /// short read (this is a convenience built on `read`, not a trait
    /// requirement every backend must reimplement).
    fn read_exact(&mut self, buf: &mut [u8]) -> DemuxResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(DemuxError::new(
                    ErrorKind::Io,
                    format!("unexpected EOF: wanted {} bytes, got {filled}", buf.len()),
                ));
            }
            filled += n;
        }
        Ok(())
    }

    /// Reads a little-endian `u16`.
    fn read_u16_le(&mut self) -> DemuxResult<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    /// Reads a little-endian `u32`.
    fn read_u32_le(&mut self) -> DemuxResult<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    /// Reads a little-endian `u64`.
    fn read_u64_le(&mut self) -> DemuxResult<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    /// Reads a big-endian `u16`.
    fn read_u16_be(&mut self) -> DemuxResult<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    /// Reads a big-endian `u32`.
    fn read_u32_be(&mut self) -> DemuxResult<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    /// Reads a big-endian `u64`.
    fn read_u64_be(&mut self) -> DemuxResult<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }

    /// Reads a 4-byte FourCC as a raw little-endian-packed tag (the natural
    /// byte order of RIFF/IFF fourccs).
    fn read_fourcc(&mut self) -> DemuxResult<[u8; 4]> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(b)
    }

    /// Advances the cursor by `count` bytes without returning their
    /// contents.
    fn skip(&mut self, count: u64) -> DemuxResult<()> {
        self.seek(count as i64, SeekOrigin::Current)?;
        Ok(())
    }

    /// Advances the cursor to the next multiple of `alignment`, if not
    /// already aligned.
    fn align_to(&mut self, alignment: u64) -> DemuxResult<()> {
        let pos = self.tell()?;
        let remainder = pos % alignment;
        if remainder != 0 {
            self.skip(alignment - remainder)?;
        }
        Ok(())
    }
}

/// Converts a fourcc's four ASCII bytes to its conventional display form.
pub fn fourcc_to_string(tag: [u8; 4]) -> String {
    tag.iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}
