use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use super::{ByteSource, SeekOrigin};
use crate::error::{DemuxError, DemuxResult, ErrorKind};

/// A [`ByteSource`] backed by a local `std::fs::File`.
///
/// Maps OS error kinds onto the crate's taxonomy rather than leaking
/// `std::io::Error` directly, so callers only ever match on [`ErrorKind`].
pub struct FileByteSource {
    file: Option<File>,
    size: Option<u64>,
}

impl FileByteSource {
    /// Opens `path` read-only and caches its size via one `metadata` call.
    pub fn open(path: impl AsRef<std::path::Path>) -> DemuxResult<Self> {
        let file = File::open(path.as_ref()).map_err(|e| map_open_error(&e))?;
        let size = file.metadata().ok().map(|m| m.len());
        Ok(Self {
            file: Some(file),
            size,
        })
    }

    /// Wraps an already-open file handle.
    pub fn from_file(file: File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self {
            file: Some(file),
            size,
        }
    }
}

fn map_open_error(err: &std::io::Error) -> DemuxError {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::Io,
        std::io::ErrorKind::PermissionDenied => ErrorKind::Io,
        _ => ErrorKind::Io,
    };
    DemuxError::new(kind, format!("failed to open file: {err}"))
}

impl ByteSource for FileByteSource {
    fn read(&mut self, buf: &mut [u8]) -> DemuxResult<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| DemuxError::new(ErrorKind::Closed, "read on closed file source"))?;
        file.read(buf).map_err(DemuxError::from)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> DemuxResult<u64> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| DemuxError::new(ErrorKind::Closed, "seek on closed file source"))?;
        let pos = match origin {
            SeekOrigin::Start => {
                if offset < 0 {
                    return Err(DemuxError::new(
                        ErrorKind::Validation,
                        "negative absolute seek position",
                    ));
                }
                SeekFrom::Start(offset as u64)
            }
            SeekOrigin::Current => SeekFrom::Current(offset),
            SeekOrigin::End => SeekFrom::End(offset),
        };
        file.seek(pos).map_err(DemuxError::from)
    }

    fn tell(&mut self) -> DemuxResult<u64> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| DemuxError::new(ErrorKind::Closed, "tell on closed file source"))?;
        file.stream_position().map_err(DemuxError::from)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn close(&mut self) {
        self.file = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_and_seek_roundtrip() {
        let mut tmp = tempfile_for_test();
        tmp.write_all(b"hello world").unwrap();
        let mut src = FileByteSource::from_file(tmp);

        let mut buf = [0u8; 5];
        src.seek(0, SeekOrigin::Start).unwrap();
        src.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(src.tell().unwrap(), 5);
    }

    #[test]
    fn closed_source_errors() {
        let tmp = tempfile_for_test();
        let mut src = FileByteSource::from_file(tmp);
        src.close();
        let mut buf = [0u8; 1];
        let err = src.read(&mut buf).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Closed);
    }

    fn tempfile_for_test() -> File {
        use std::fs::OpenOptions;
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("condemux-test-{}-{n}", std::process::id()));
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .unwrap()
    }
}
