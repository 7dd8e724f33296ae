//! [`StreamInfo`] and [`MediaChunk`], the two carrier types demuxers hand
//! back to callers.
//!
//! Both types are grounded directly in `Demuxer.h`'s `StreamInfo` and
//! `MediaChunk` structs: same field set, same validity helpers, but
//! `MediaChunk`'s buffer is returned to the [`crate::buffer_pool::BufferPool`]
//! on drop instead of a destructor reaching for a process-wide singleton.

use crate::buffer_pool::{BufferPool, PooledBuffer};
use crate::common::{BitDepth, ChannelCount, CodecFamily, SampleRate, StreamId};

/// Metadata describing one logical stream within a container.
///
/// Timing is carried in both sample frames and milliseconds, matching the
/// original's rationale: sample counts are exact, milliseconds are
/// convenient for UI and seeking.
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    /// Unique, non-zero identifier within the owning demuxer.
    pub stream_id: StreamId,
    /// Broad codec family, used for dispatch and the CLI's `probe` output.
    pub codec_family: CodecFamily,
    /// Codec name, e.g. `"pcm_s16le"`, `"vorbis"`, `"aac"`, `"flac"`.
    pub codec_name: String,
    /// Format-specific codec identifier (WAVE format tag, ISO BMFF sample
    /// entry fourcc, ...).
    pub codec_tag: u32,

    /// Sample rate in Hz, `0` if not applicable.
    pub sample_rate: SampleRate,
    /// Channel count, `0` if not applicable.
    pub channels: ChannelCount,
    /// Bits per sample, `0` if not applicable.
    pub bits_per_sample: BitDepth,
    /// Average bitrate in bits per second, `0` if unknown.
    pub bitrate: u32,

    /// Extra codec-specific configuration (e.g. a FLAC STREAMINFO block, an
    /// AAC `AudioSpecificConfig`, Vorbis/Opus header packets).
    pub codec_data: Vec<u8>,

    /// Total duration in sample frames, `0` if unknown.
    pub duration_samples: u64,
    /// Total duration in milliseconds, `0` if unknown.
    pub duration_ms: u64,

    /// Track artist, if present in the container.
    pub artist: String,
    /// Track title, if present in the container.
    pub title: String,
    /// Album name, if present in the container.
    pub album: String,
}

impl Default for CodecFamily {
    fn default() -> Self {
        CodecFamily::Unknown
    }
}

impl StreamInfo {
    /// Creates a stream descriptor with the fields required to be non-zero.
    pub fn new(stream_id: StreamId, codec_family: CodecFamily, codec_name: impl Into<String>) -> Self {
        Self {
            stream_id,
            codec_family,
            codec_name: codec_name.into(),
            ..Default::default()
        }
    }

    /// `true` once a stream id has been assigned and a codec name is known.
    pub fn is_valid(&self) -> bool {
        self.stream_id != 0 && !self.codec_name.is_empty()
    }
}

/// A discrete unit of (typically still-compressed) media data read from a
/// container, tagged with the stream it belongs to and its timing.
///
/// The backing buffer is borrowed from a [`BufferPool`] and returned there
/// automatically when the chunk is dropped, via [`PooledBuffer`]'s `Drop`
/// impl — no explicit destructor logic lives here.
#[derive(Debug)]
pub struct MediaChunk {
    /// Stream this chunk belongs to.
    pub stream_id: StreamId,
    /// Compressed (or, for PCM, raw) payload.
    pub data: PooledBuffer,
    /// Ogg-specific granule position; `0` for non-Ogg formats.
    pub granule_position: u64,
    /// Timestamp in sample frames, for non-Ogg formats.
    pub timestamp_samples: u64,
    /// Whether this chunk can be decoded without prior chunks. Audio chunks
    /// are keyframes unless a format states otherwise.
    pub is_keyframe: bool,
    /// Offset in the byte source this chunk was read from, used to speed up
    /// subsequent seeks.
    pub file_offset: u64,
}

impl MediaChunk {
    /// Allocates a chunk whose buffer is acquired from `pool` and sized to
    /// `data_size`, then immediately zero-filled by the caller via `data_mut`.
    pub fn with_capacity(pool: &BufferPool, stream_id: StreamId, data_size: usize) -> Self {
        let mut buf = pool.acquire(data_size);
        buf.resize(data_size);
        Self {
            stream_id,
            data: buf,
            granule_position: 0,
            timestamp_samples: 0,
            is_keyframe: true,
            file_offset: 0,
        }
    }

    /// Wraps an already-populated pooled buffer.
    pub fn from_buffer(stream_id: StreamId, data: PooledBuffer) -> Self {
        Self {
            stream_id,
            data,
            granule_position: 0,
            timestamp_samples: 0,
            is_keyframe: true,
            file_offset: 0,
        }
    }

    /// `true` when this chunk carries a real stream id and non-empty data;
    /// used by demuxers to distinguish a genuine chunk from the sentinel
    /// returned at end of stream (P5).
    pub fn is_valid(&self) -> bool {
        self.stream_id != 0 && !self.data.is_empty()
    }

    /// `true` when the chunk carries no data, regardless of stream id.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the payload in bytes.
    pub fn data_size(&self) -> usize {
        self.data.len()
    }
}
