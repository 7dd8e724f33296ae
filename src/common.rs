//! Small shared types used across byte sources, demuxers and the buffer pool.

/// Identifies one logical stream within a container, stable for the
/// lifetime of a [`crate::Demuxer`] instance.
pub type StreamId = u32;

/// Stream sample rate (a frame rate or samples per second per channel).
pub type SampleRate = u32;

/// Number of channels in a stream.
pub type ChannelCount = u16;

/// Bits per sample for PCM-family codecs; `0` when not applicable (e.g.
/// compressed codecs that carry their own bit depth in-band).
pub type BitDepth = u16;

/// The broad kind of a logical stream, used for filtering and for the CLI's
/// `probe` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFamily {
    /// PCM or a simple ADPCM variant carried in a RIFF/IFF chunk.
    Pcm,
    /// Vorbis, Opus or FLAC carried in Ogg pages.
    Ogg,
    /// AAC, ALAC or another codec carried in ISO BMFF sample tables.
    IsoBmff,
    /// A stream whose codec this build recognises by tag but does not decode.
    Unknown,
}

impl CodecFamily {
    /// `true` for audio-bearing families; this crate does not yet model
    /// video or subtitle streams distinctly from `Unknown`.
    pub fn is_audio(self) -> bool {
        !matches!(self, CodecFamily::Unknown)
    }
}
