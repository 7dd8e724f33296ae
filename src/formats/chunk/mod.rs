//! RIFF/IFF/AIFF chunk-tagged container demuxer.
//!
//! Grounded in `ChunkDemuxer.h`: one demuxer handles both little-endian
//! RIFF (WAV) and big-endian FORM (AIFF) containers, dispatching on the
//! container's form type after reading its header. Chunk constants,
//! the `AudioStreamData` field set, and the recovery method names are
//! carried over; the per-chunk parsing bodies are new since the header
//! only declares their signatures.

use crate::buffer_pool::BufferPool;
use crate::byte_source::{fourcc_to_string, ByteSource, SeekOrigin};
use crate::chunk::{MediaChunk, StreamInfo};
use crate::common::{CodecFamily, StreamId};
use crate::demuxer::{require_known_stream, Demuxer};
use crate::error::{DemuxError, DemuxResult, ErrorKind, ErrorStats};

const FORM: [u8; 4] = *b"FORM";
const RIFF: [u8; 4] = *b"RIFF";
const LIST: [u8; 4] = *b"LIST";
const WAVE: [u8; 4] = *b"WAVE";
const AIFF_FORM_TYPE: [u8; 4] = *b"AIFF";
const AIFC_FORM_TYPE: [u8; 4] = *b"AIFC";

const FMT_: [u8; 4] = *b"fmt ";
const DATA: [u8; 4] = *b"data";
const FACT: [u8; 4] = *b"fact";
const COMM: [u8; 4] = *b"COMM";
const SSND: [u8; 4] = *b"SSND";
const NAME: [u8; 4] = *b"NAME";
const AUTH: [u8; 4] = *b"AUTH";
const COPYRIGHT: [u8; 4] = *b"(c) ";
const ANNO: [u8; 4] = *b"ANNO";

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_ALAW: u16 = 0x0006;
const WAVE_FORMAT_MULAW: u16 = 0x0007;
const WAVE_FORMAT_MPEGLAYER3: u16 = 0x0055;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Maximum bytes `skip_to_next_valid_section` scans before giving up.
const RESYNC_BUDGET: u64 = 1 << 20;
/// Target chunk duration for `read_chunk`, matching the "~100 ms" default.
const TARGET_CHUNK_MS: u64 = 100;

/// A chunk header: fourcc, declared payload size, and the absolute file
/// offset of its payload.
#[derive(Debug, Clone, Copy)]
struct Chunk {
    fourcc: [u8; 4],
    size: u32,
    data_offset: u64,
}

impl Chunk {
    /// `RIFF`/`FORM` nest another whole container and are skipped outright;
    /// `LIST` is excluded even though it nests sub-chunks, since its `INFO`
    /// form carries metadata this demuxer reads via `parse_wave_list`.
    fn is_container(&self) -> bool {
        self.fourcc == FORM || self.fourcc == RIFF
    }
}

#[derive(Debug, Default, Clone)]
struct AudioStreamData {
    stream_id: StreamId,
    data_offset: u64,
    data_size: u64,
    current_offset: u64,
    bytes_per_frame: u32,

    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    avg_bytes_per_sec: u32,
    block_align: u16,
    bits_per_sample: u16,
    compression_type: [u8; 4],
    extra_data: Vec<u8>,

    title: String,
    artist: String,
    album: String,

    total_samples: u32,
    has_fact_chunk: bool,
}

/// Demuxer for RIFF (WAV) and FORM (AIFF/AIFF-C) containers.
pub struct ChunkDemuxer {
    source: Box<dyn ByteSource>,
    pool: BufferPool,

    form_type: [u8; 4],
    big_endian: bool,
    form_payload_end: u64,

    stream: Option<AudioStreamData>,
    stream_info: Vec<StreamInfo>,
    eof: bool,
    duration_ms: u64,
    position_ms: u64,
    parsed: bool,

    errors: ErrorStats,
}

impl ChunkDemuxer {
    /// Builds a demuxer around `source`. Call [`Demuxer::parse_container`]
    /// before using any other method.
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self {
            source,
            pool: BufferPool::new(),
            form_type: [0; 4],
            big_endian: false,
            form_payload_end: 0,
            stream: None,
            stream_info: Vec::new(),
            eof: false,
            duration_ms: 0,
            position_ms: 0,
            parsed: false,
            errors: ErrorStats::new(),
        }
    }

    /// Factory entry point registered with [`crate::registry::Registry`].
    pub fn boxed(source: Box<dyn ByteSource>) -> Box<dyn Demuxer> {
        Box::new(Self::new(source))
    }

    fn read_u16(&mut self) -> DemuxResult<u16> {
        if self.big_endian {
            self.source.read_u16_be()
        } else {
            self.source.read_u16_le()
        }
    }

    fn read_u32(&mut self) -> DemuxResult<u32> {
        if self.big_endian {
            self.source.read_u32_be()
        } else {
            self.source.read_u32_le()
        }
    }

    fn read_chunk_header(&mut self) -> DemuxResult<Chunk> {
        let offset = self.source.tell()?;
        let fourcc = self.source.read_fourcc()?;
        let size = self.read_u32()?;
        let data_offset = self.source.tell()?;
        let _ = offset;
        Ok(Chunk {
            fourcc,
            size,
            data_offset,
        })
    }

    fn skip_chunk(&mut self, chunk: &Chunk) -> DemuxResult<()> {
        self.source.seek(chunk.data_offset as i64, SeekOrigin::Start)?;
        self.source.skip(chunk.size as u64)?;
        if chunk.size % 2 == 1 {
            self.source.skip(1)?;
        }
        Ok(())
    }

    fn clamp_to_form(&mut self, chunk: &Chunk) -> u64 {
        let declared_end = chunk.data_offset + chunk.size as u64;
        if declared_end > self.form_payload_end {
            self.errors.record(
                ErrorKind::Validation,
                "chunk size extends past declared form payload; clamped",
                Some(chunk.data_offset),
            );
            self.form_payload_end.saturating_sub(chunk.data_offset)
        } else {
            chunk.size as u64
        }
    }

    fn is_plausible_fourcc(fourcc: [u8; 4]) -> bool {
        fourcc.iter().all(|&b| b.is_ascii_graphic() || b == b' ')
    }

    fn parse_wave_format(&mut self, chunk: &Chunk) -> DemuxResult<()> {
        self.source.seek(chunk.data_offset as i64, SeekOrigin::Start)?;
        let mut s = AudioStreamData {
            stream_id: 1,
            ..Default::default()
        };
        s.format_tag = self.read_u16()?;
        s.channels = self.read_u16()?;
        s.sample_rate = self.read_u32()?;
        s.avg_bytes_per_sec = self.read_u32()?;
        s.block_align = self.read_u16()?;
        s.bits_per_sample = self.read_u16()?;

        if chunk.size as usize > 16 {
            let extra_len = self.source.read_u16_le().unwrap_or(0) as usize;
            let mut extra = vec![0u8; extra_len];
            if self.source.read_exact(&mut extra).is_ok() {
                if s.format_tag == WAVE_FORMAT_EXTENSIBLE && extra.len() >= 16 {
                    // Sub-format GUID's first two bytes carry the real format tag.
                    s.format_tag = u16::from_le_bytes([extra[0], extra[1]]);
                }
                s.extra_data = extra;
            }
        }

        s.bytes_per_frame = s.block_align.max(1) as u32;
        self.stream = Some(s);
        Ok(())
    }

    fn parse_wave_data(&mut self, chunk: &Chunk) -> DemuxResult<()> {
        let size = self.clamp_to_form(chunk);
        if let Some(s) = self.stream.as_mut() {
            s.data_offset = chunk.data_offset;
            s.data_size = size;
            s.current_offset = chunk.data_offset;
        }
        Ok(())
    }

    fn parse_wave_fact(&mut self, chunk: &Chunk) -> DemuxResult<()> {
        self.source.seek(chunk.data_offset as i64, SeekOrigin::Start)?;
        let total = self.source.read_u32_le()?;
        if let Some(s) = self.stream.as_mut() {
            s.total_samples = total;
            s.has_fact_chunk = true;
        }
        Ok(())
    }

    fn parse_wave_list(&mut self, chunk: &Chunk) -> DemuxResult<()> {
        self.source.seek(chunk.data_offset as i64, SeekOrigin::Start)?;
        let list_type = self.source.read_fourcc()?;
        if &list_type != b"INFO" {
            return Ok(());
        }
        let end = chunk.data_offset + chunk.size as u64;
        while self.source.tell()? + 8 <= end {
            let sub = self.read_chunk_header()?;
            if !Self::is_plausible_fourcc(sub.fourcc) {
                break;
            }
            let mut text = vec![0u8; sub.size as usize];
            self.source.read_exact(&mut text)?;
            let text = String::from_utf8_lossy(&text).trim_end_matches('\0').to_string();
            if let Some(s) = self.stream.as_mut() {
                match &sub.fourcc {
                    b"INAM" => s.title = text,
                    b"IART" => s.artist = text,
                    b"IPRD" => s.album = text,
                    _ => {}
                }
            }
            if sub.size % 2 == 1 {
                self.source.skip(1)?;
            }
        }
        Ok(())
    }

    fn ieee80_to_rate(bytes: [u8; 10]) -> u32 {
        let exponent = u16::from_be_bytes([bytes[0], bytes[1]]);
        let mantissa = u64::from_be_bytes(bytes[2..10].try_into().unwrap());
        if exponent == 0 && mantissa == 0 {
            return 0;
        }
        let sign = if exponent & 0x8000 != 0 { -1.0 } else { 1.0 };
        let exp = (exponent & 0x7fff) as i32 - 16383 - 63;
        let value = sign * (mantissa as f64) * 2f64.powi(exp);
        value.round() as u32
    }

    fn parse_aiff_common(&mut self, chunk: &Chunk) -> DemuxResult<()> {
        self.source.seek(chunk.data_offset as i64, SeekOrigin::Start)?;
        let mut s = self.stream.take().unwrap_or(AudioStreamData {
            stream_id: 1,
            ..Default::default()
        });
        s.channels = self.source.read_u16_be()?;
        let num_frames = self.source.read_u32_be()?;
        s.bits_per_sample = self.source.read_u16_be()?;
        let mut rate_bytes = [0u8; 10];
        self.source.read_exact(&mut rate_bytes)?;
        s.sample_rate = Self::ieee80_to_rate(rate_bytes);
        s.total_samples = num_frames;
        s.has_fact_chunk = true;

        s.compression_type = *b"NONE";
        let is_aifc = self.form_type == AIFC_FORM_TYPE;
        if is_aifc && chunk.data_offset + chunk.size as u64 >= self.source.tell()? + 4 {
            if let Ok(tag) = self.source.read_fourcc() {
                s.compression_type = tag;
            }
        }

        s.bytes_per_frame = (s.bits_per_sample as u32 / 8).max(1) * s.channels.max(1) as u32;
        self.stream = Some(s);
        Ok(())
    }

    fn parse_aiff_sound_data(&mut self, chunk: &Chunk) -> DemuxResult<()> {
        self.source.seek(chunk.data_offset as i64, SeekOrigin::Start)?;
        let ssnd_offset = self.source.read_u32_be()?;
        let _ssnd_block_size = self.source.read_u32_be()?;
        let size = self.clamp_to_form(chunk);
        let header_len = 8u64;
        if let Some(s) = self.stream.as_mut() {
            s.data_offset = chunk.data_offset + header_len + ssnd_offset as u64;
            s.data_size = size.saturating_sub(header_len + ssnd_offset as u64);
            s.current_offset = s.data_offset;
        }
        Ok(())
    }

    fn parse_aiff_text(&mut self, chunk: &Chunk, field: AiffTextField) -> DemuxResult<()> {
        self.source.seek(chunk.data_offset as i64, SeekOrigin::Start)?;
        let mut text = vec![0u8; chunk.size as usize];
        self.source.read_exact(&mut text)?;
        let text = String::from_utf8_lossy(&text).to_string();
        if let Some(s) = self.stream.as_mut() {
            match field {
                AiffTextField::Name => s.title = text,
                AiffTextField::Auth => s.artist = text,
                AiffTextField::Copyright | AiffTextField::Anno => {}
            }
        }
        Ok(())
    }

    fn format_tag_to_codec_name(format_tag: u16) -> &'static str {
        match format_tag {
            WAVE_FORMAT_PCM => "pcm",
            WAVE_FORMAT_IEEE_FLOAT => "ieee_float",
            WAVE_FORMAT_ALAW => "pcm_alaw",
            WAVE_FORMAT_MULAW => "pcm_mulaw",
            WAVE_FORMAT_MPEGLAYER3 => "mp3",
            _ => "unknown",
        }
    }

    fn aiff_compression_to_codec_name(compression: [u8; 4]) -> &'static str {
        match &compression {
            b"NONE" => "pcm",
            b"sowt" => "pcm",
            b"fl32" => "ieee_float",
            b"fl64" => "ieee_float",
            b"alaw" => "pcm_alaw",
            b"ulaw" => "pcm_mulaw",
            _ => "unknown",
        }
    }

    fn build_stream_info(&self) -> Option<StreamInfo> {
        let s = self.stream.as_ref()?;
        let codec_name = if self.form_type == WAVE {
            Self::format_tag_to_codec_name(s.format_tag).to_string()
        } else {
            Self::aiff_compression_to_codec_name(s.compression_type).to_string()
        };

        let mut info = StreamInfo::new(s.stream_id, CodecFamily::Pcm, codec_name);
        info.codec_tag = s.format_tag as u32;
        info.sample_rate = s.sample_rate;
        info.channels = s.channels;
        info.bits_per_sample = s.bits_per_sample;
        info.bitrate = s.avg_bytes_per_sec * 8;
        info.codec_data = s.extra_data.clone();
        info.title = s.title.clone();
        info.artist = s.artist.clone();
        info.album = s.album.clone();

        if s.has_fact_chunk && s.total_samples > 0 {
            info.duration_samples = s.total_samples as u64;
        } else if s.bytes_per_frame > 0 {
            info.duration_samples = s.data_size / s.bytes_per_frame as u64;
        }
        if s.sample_rate > 0 {
            info.duration_ms = info.duration_samples * 1000 / s.sample_rate as u64;
        }
        Some(info)
    }
}

enum AiffTextField {
    Name,
    Auth,
    Copyright,
    Anno,
}

impl Demuxer for ChunkDemuxer {
    fn parse_container(&mut self) -> DemuxResult<()> {
        self.source.seek(0, SeekOrigin::Start)?;
        let container_fourcc = self.source.read_fourcc()?;
        self.big_endian = container_fourcc == FORM;
        if container_fourcc != FORM && container_fourcc != RIFF {
            return Err(DemuxError::format_fatal(
                format!(
                    "not a RIFF/FORM container (got '{}')",
                    fourcc_to_string(container_fourcc)
                ),
                0,
            ));
        }

        let payload_size = self.read_u32()?;
        let header_start = self.source.tell()?;
        self.form_payload_end = header_start + payload_size as u64;
        self.form_type = self.source.read_fourcc()?;

        if self.form_type != WAVE && self.form_type != AIFF_FORM_TYPE && self.form_type != AIFC_FORM_TYPE {
            return Err(DemuxError::format_fatal(
                format!("unsupported form type '{}'", fourcc_to_string(self.form_type)),
                header_start,
            ));
        }

        loop {
            let pos = self.source.tell()?;
            if pos + 8 > self.form_payload_end {
                break;
            }
            let chunk = match self.read_chunk_header() {
                Ok(c) => c,
                Err(_) => break,
            };

            if !Self::is_plausible_fourcc(chunk.fourcc) || chunk.size > (u32::MAX / 2) {
                self.errors.record(
                    ErrorKind::Format,
                    "invalid chunk header; attempting resync",
                    Some(pos),
                );
                if !self.skip_to_next_valid_section() {
                    break;
                }
                continue;
            }

            if chunk.size == 0 {
                self.skip_chunk(&chunk)?;
                continue;
            }

            if chunk.is_container() {
                self.skip_chunk(&chunk)?;
                continue;
            }

            match (&chunk.fourcc, self.form_type == WAVE) {
                (f, true) if *f == FMT_ => self.parse_wave_format(&chunk)?,
                (f, true) if *f == DATA => self.parse_wave_data(&chunk)?,
                (f, true) if *f == FACT => self.parse_wave_fact(&chunk)?,
                (f, true) if *f == LIST => self.parse_wave_list(&chunk)?,
                (f, false) if *f == COMM => self.parse_aiff_common(&chunk)?,
                (f, false) if *f == SSND => self.parse_aiff_sound_data(&chunk)?,
                (f, false) if *f == NAME => self.parse_aiff_text(&chunk, AiffTextField::Name)?,
                (f, false) if *f == AUTH => self.parse_aiff_text(&chunk, AiffTextField::Auth)?,
                (f, false) if *f == COPYRIGHT => self.parse_aiff_text(&chunk, AiffTextField::Copyright)?,
                (f, false) if *f == ANNO => self.parse_aiff_text(&chunk, AiffTextField::Anno)?,
                _ => {}
            }

            self.skip_chunk(&chunk)?;
        }

        if let Some(info) = self.build_stream_info() {
            self.duration_ms = info.duration_ms;
            self.stream_info = vec![info];
        } else {
            return Err(DemuxError::format_fatal("no audio stream found in container", 0));
        }

        self.parsed = true;
        Ok(())
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.stream_info
    }

    fn read_chunk(&mut self) -> DemuxResult<MediaChunk> {
        let Some(s) = self.stream.as_mut() else {
            self.eof = true;
            return Ok(MediaChunk::from_buffer(0, self.pool.acquire(0)));
        };
        let data_end = s.data_offset + s.data_size;
        if s.current_offset >= data_end {
            self.eof = true;
            return Ok(MediaChunk::from_buffer(0, self.pool.acquire(0)));
        }

        let bytes_per_frame = s.bytes_per_frame.max(1) as u64;
        let target_bytes = (s.sample_rate as u64 * bytes_per_frame * TARGET_CHUNK_MS / 1000).max(bytes_per_frame);
        let remaining = data_end - s.current_offset;
        let read_len = target_bytes.min(remaining) as usize;

        self.source.seek(s.current_offset as i64, SeekOrigin::Start)?;
        let mut chunk = MediaChunk::with_capacity(&self.pool, s.stream_id, read_len);
        let n = self.source.read(&mut chunk.data)?;
        chunk.data.truncate(n);

        let frame_index = (s.current_offset - s.data_offset) / bytes_per_frame;
        chunk.timestamp_samples = frame_index;
        chunk.file_offset = s.current_offset;

        s.current_offset += n as u64;
        let sample_rate = s.sample_rate.max(1) as u64;
        self.position_ms = frame_index * 1000 / sample_rate;

        if n == 0 {
            self.eof = true;
        }
        Ok(chunk)
    }

    fn read_chunk_for_stream(&mut self, stream_id: StreamId) -> DemuxResult<MediaChunk> {
        require_known_stream(&self.stream_info, stream_id)?;
        self.read_chunk()
    }

    fn seek_to(&mut self, timestamp_ms: u64) -> DemuxResult<()> {
        let target_ms = timestamp_ms.min(self.duration_ms);
        let Some(s) = self.stream.as_mut() else {
            return Err(DemuxError::new(ErrorKind::Validation, "seek before successful parse"));
        };
        let target_frame = target_ms * s.sample_rate as u64 / 1000;
        let target_byte = s.data_offset + target_frame * s.bytes_per_frame.max(1) as u64;
        s.current_offset = target_byte.min(s.data_offset + s.data_size);
        self.position_ms = target_ms;
        self.eof = false;
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn position_ms(&self) -> u64 {
        self.position_ms
    }

    fn error_stats(&self) -> &ErrorStats {
        &self.errors
    }

    fn skip_to_next_valid_section(&mut self) -> bool {
        let Ok(start) = self.source.tell() else { return false };
        let mut probe = [0u8; 1];
        let mut scanned = 0u64;
        let mut pos = start;
        while scanned < RESYNC_BUDGET && pos + 8 <= self.form_payload_end {
            if self.source.seek(pos as i64, SeekOrigin::Start).is_err() {
                return false;
            }
            let mut fourcc = [0u8; 4];
            if self.source.read_exact(&mut fourcc).is_err() {
                return false;
            }
            if Self::is_plausible_fourcc(fourcc) {
                let _ = self.source.seek(pos as i64, SeekOrigin::Start);
                return true;
            }
            let _ = probe;
            pos += 1;
            scanned += 1;
        }
        false
    }

    fn reset_internal_state(&mut self) -> bool {
        if let Some(s) = self.stream.as_mut() {
            s.current_offset = s.data_offset;
            self.position_ms = 0;
            self.eof = false;
            return true;
        }
        false
    }

    fn enable_fallback_mode(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::MemoryByteSource;

    fn riff_header(form_type: &[u8; 4], payload_len: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(b"RIFF");
        v.extend_from_slice(&payload_len.to_le_bytes());
        v.extend_from_slice(form_type);
        v
    }

    fn fmt_chunk(channels: u16, sample_rate: u32, bits: u16) -> Vec<u8> {
        let block_align = channels * (bits / 8);
        let byte_rate = sample_rate * block_align as u32;
        let mut v = Vec::new();
        v.extend_from_slice(b"fmt ");
        v.extend_from_slice(&16u32.to_le_bytes());
        v.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        v.extend_from_slice(&channels.to_le_bytes());
        v.extend_from_slice(&sample_rate.to_le_bytes());
        v.extend_from_slice(&byte_rate.to_le_bytes());
        v.extend_from_slice(&block_align.to_le_bytes());
        v.extend_from_slice(&bits.to_le_bytes());
        v
    }

    fn data_chunk(bytes: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(b"data");
        v.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        v.extend_from_slice(bytes);
        v
    }

    #[test]
    fn s1_minimal_wav_parses_one_stream() {
        let fmt = fmt_chunk(2, 44100, 16);
        let data = data_chunk(&vec![0u8; 1764]);
        let payload_len = (4 + fmt.len() + data.len()) as u32;
        let mut bytes = riff_header(&WAVE, payload_len);
        bytes.extend_from_slice(&fmt);
        bytes.extend_from_slice(&data);

        let mut demux = ChunkDemuxer::new(Box::new(MemoryByteSource::new(bytes)));
        demux.parse_container().unwrap();
        assert_eq!(demux.streams().len(), 1);
        let info = &demux.streams()[0];
        assert_eq!(info.codec_name, "pcm");
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert_eq!(demux.duration_ms(), 10);

        let mut total = 0;
        loop {
            let chunk = demux.read_chunk().unwrap();
            if chunk.is_empty() {
                break;
            }
            total += chunk.data_size();
        }
        assert_eq!(total, 1764);
        assert!(demux.is_eof());
    }

    #[test]
    fn s2_junk_chunk_is_skipped() {
        let fmt = fmt_chunk(2, 44100, 16);
        let junk_payload = vec![0u8; 50];
        let mut junk = Vec::new();
        junk.extend_from_slice(b"JUNK");
        junk.extend_from_slice(&50u32.to_le_bytes());
        junk.extend_from_slice(&junk_payload);
        let data = data_chunk(&vec![0u8; 100]);

        let payload_len = (4 + fmt.len() + junk.len() + data.len()) as u32;
        let mut bytes = riff_header(&WAVE, payload_len);
        bytes.extend_from_slice(&fmt);
        bytes.extend_from_slice(&junk);
        bytes.extend_from_slice(&data);

        let mut demux = ChunkDemuxer::new(Box::new(MemoryByteSource::new(bytes)));
        demux.parse_container().unwrap();
        assert_eq!(demux.streams().len(), 1);
        let chunk = demux.read_chunk().unwrap();
        assert_eq!(chunk.data_size(), 100);
    }

    #[test]
    fn s3_truncated_data_chunk_reads_only_available_bytes() {
        let fmt = fmt_chunk(2, 44100, 16);
        let available = vec![0xAAu8; 4096];
        let mut data = Vec::new();
        data.extend_from_slice(b"data");
        data.extend_from_slice(&(1024 * 1024u32).to_le_bytes());
        data.extend_from_slice(&available);

        let payload_len = (4 + fmt.len() + data.len()) as u32;
        let mut bytes = riff_header(&WAVE, payload_len);
        bytes.extend_from_slice(&fmt);
        bytes.extend_from_slice(&data);

        let mut demux = ChunkDemuxer::new(Box::new(MemoryByteSource::new(bytes)));
        demux.parse_container().unwrap();
        assert!(demux.error_stats().count(ErrorKind::Validation) >= 1);

        let mut total = 0;
        loop {
            let chunk = demux.read_chunk().unwrap();
            if chunk.is_empty() {
                break;
            }
            total += chunk.data_size();
        }
        assert_eq!(total, 4096);
        assert!(demux.is_eof());
    }

    #[test]
    fn wave_list_info_chunk_is_parsed_for_title_artist_album() {
        fn info_sub_chunk(id: &[u8; 4], text: &str) -> Vec<u8> {
            let mut bytes = text.as_bytes().to_vec();
            bytes.push(0); // NUL-terminated, per INFO convention
            if bytes.len() % 2 == 1 {
                bytes.push(0);
            }
            let mut v = Vec::new();
            v.extend_from_slice(id);
            v.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            v.extend_from_slice(&bytes);
            v
        }

        let fmt = fmt_chunk(2, 44100, 16);
        let data = data_chunk(&vec![0u8; 100]);

        let mut info_body = Vec::new();
        info_body.extend_from_slice(b"INFO");
        info_body.extend_from_slice(&info_sub_chunk(b"INAM", "Track Title"));
        info_body.extend_from_slice(&info_sub_chunk(b"IART", "Some Artist"));
        info_body.extend_from_slice(&info_sub_chunk(b"IPRD", "An Album"));

        let mut list = Vec::new();
        list.extend_from_slice(b"LIST");
        list.extend_from_slice(&(info_body.len() as u32).to_le_bytes());
        list.extend_from_slice(&info_body);

        let payload_len = (4 + fmt.len() + list.len() + data.len()) as u32;
        let mut bytes = riff_header(&WAVE, payload_len);
        bytes.extend_from_slice(&fmt);
        bytes.extend_from_slice(&list);
        bytes.extend_from_slice(&data);

        let mut demux = ChunkDemuxer::new(Box::new(MemoryByteSource::new(bytes)));
        demux.parse_container().unwrap();
        let info = &demux.streams()[0];
        assert_eq!(info.title, "Track Title");
        assert_eq!(info.artist, "Some Artist");
        assert_eq!(info.album, "An Album");
    }

    #[test]
    fn s4_aiff_with_80bit_sample_rate() {
        let mut comm = Vec::new();
        comm.extend_from_slice(b"COMM");
        comm.extend_from_slice(&18u32.to_be_bytes());
        comm.extend_from_slice(&2u16.to_be_bytes()); // channels
        comm.extend_from_slice(&((100 / 4) as u32).to_be_bytes()); // num sample frames (100B / 4 bytes-per-frame)
        comm.extend_from_slice(&16u16.to_be_bytes()); // bits per sample
        comm.extend_from_slice(&[0x40, 0x0E, 0xAC, 0x44, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let mut ssnd = Vec::new();
        ssnd.extend_from_slice(b"SSND");
        let ssnd_payload_len = 8 + 100;
        ssnd.extend_from_slice(&(ssnd_payload_len as u32).to_be_bytes());
        ssnd.extend_from_slice(&0u32.to_be_bytes()); // offset
        ssnd.extend_from_slice(&0u32.to_be_bytes()); // block size
        ssnd.extend_from_slice(&vec![0u8; 100]);

        let payload_len = (4 + comm.len() + ssnd.len()) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"FORM");
        bytes.extend_from_slice(&payload_len.to_be_bytes());
        bytes.extend_from_slice(b"AIFF");
        bytes.extend_from_slice(&comm);
        bytes.extend_from_slice(&ssnd);

        let mut demux = ChunkDemuxer::new(Box::new(MemoryByteSource::new(bytes)));
        demux.parse_container().unwrap();
        let info = &demux.streams()[0];
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.codec_name, "pcm");

        let chunk = demux.read_chunk().unwrap();
        assert_eq!(chunk.data_size(), 100);
    }
}
