use std::io::Cursor;

use super::{ByteSource, SeekOrigin};
use crate::error::{DemuxError, DemuxResult, ErrorKind};

/// A [`ByteSource`] over an in-memory buffer.
///
/// Not named as its own component in the component table — it is the
/// trivial third backend behind "local file and HTTP", used by tests and
/// by callers that already hold a fully decoded buffer (e.g. an
/// in-memory-cached download).
pub struct MemoryByteSource {
    cursor: Option<Cursor<Vec<u8>>>,
    size: u64,
}

impl MemoryByteSource {
    /// Wraps `data` for reading.
    pub fn new(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self {
            cursor: Some(Cursor::new(data)),
            size,
        }
    }
}

impl ByteSource for MemoryByteSource {
    fn read(&mut self, buf: &mut [u8]) -> DemuxResult<usize> {
        use std::io::Read;
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| DemuxError::new(ErrorKind::Closed, "read on closed memory source"))?;
        cursor.read(buf).map_err(DemuxError::from)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> DemuxResult<u64> {
        use std::io::Seek;
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| DemuxError::new(ErrorKind::Closed, "seek on closed memory source"))?;
        let pos = match origin {
            SeekOrigin::Start => {
                if offset < 0 {
                    return Err(DemuxError::new(
                        ErrorKind::Validation,
                        "negative absolute seek position",
                    ));
                }
                std::io::SeekFrom::Start(offset as u64)
            }
            SeekOrigin::Current => std::io::SeekFrom::Current(offset),
            SeekOrigin::End => std::io::SeekFrom::End(offset),
        };
        cursor.seek(pos).map_err(DemuxError::from)
    }

    fn tell(&mut self) -> DemuxResult<u64> {
        use std::io::Seek;
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| DemuxError::new(ErrorKind::Closed, "tell on closed memory source"))?;
        cursor.stream_position().map_err(DemuxError::from)
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn close(&mut self) {
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_past_end_then_read_returns_zero() {
        let mut src = MemoryByteSource::new(vec![1, 2, 3]);
        src.seek(10, SeekOrigin::Start).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn negative_absolute_seek_is_validation_error() {
        let mut src = MemoryByteSource::new(vec![1, 2, 3]);
        let err = src.seek(-1, SeekOrigin::Start).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
