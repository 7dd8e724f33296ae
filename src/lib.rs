//! Container demultiplexing: read audio streams, chunks, and metadata out
//! of RIFF/WAV, AIFF, Ogg, and ISO BMFF/MP4 containers without decoding
//! the audio itself.
//!
//! The entry point for most callers is [`registry::global`], which probes
//! a [`byte_source::ByteSource`] against every compiled-in format and
//! constructs the matching [`Demuxer`].

pub mod buffer_pool;
pub mod byte_source;
pub mod chunk;
pub mod common;
pub mod demuxer;
pub mod error;
pub mod formats;
pub mod registry;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use byte_source::{ByteSource, SeekOrigin};
pub use chunk::{MediaChunk, StreamInfo};
pub use common::{BitDepth, ChannelCount, CodecFamily, SampleRate, StreamId};
pub use demuxer::Demuxer;
pub use error::{DemuxError, DemuxResult, ErrorKind, ErrorStats, RecoveryHint};
pub use registry::{global as registry, Registry};
