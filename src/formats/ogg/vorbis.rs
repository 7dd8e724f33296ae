//! Vorbis I header packet parsing.
//!
//! Grounded in `spec.md` §4.F's per-codec breakdown; there is no Vorbis
//! parsing code in `original_source/` to crib from, so the field layout
//! here follows the Vorbis I specification's identification and comment
//! header packets directly.

use crate::error::{DemuxError, DemuxResult, ErrorKind};

pub const HEADERS_NEEDED: u32 = 3;

/// Parsed fields from the identification header (packet 0).
#[derive(Debug, Default)]
pub struct IdHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bitrate_nominal: u32,
}

/// Parses packet 0, the identification header: `\x01vorbis` followed by
/// version, channels, sample rate, and the three bitrate fields.
pub fn parse_id_header(packet: &[u8]) -> DemuxResult<IdHeader> {
    if packet.len() < 30 || &packet[0..7] != b"\x01vorbis" {
        return Err(DemuxError::new(ErrorKind::Format, "not a Vorbis identification header"));
    }
    let channels = packet[11] as u16;
    let sample_rate = u32::from_le_bytes(packet[12..16].try_into().unwrap());
    let bitrate_nominal = i32::from_le_bytes(packet[20..24].try_into().unwrap()).max(0) as u32;
    Ok(IdHeader {
        channels,
        sample_rate,
        bitrate_nominal,
    })
}

/// Parsed ARTIST/TITLE/ALBUM fields from the comment header (packet 1).
#[derive(Debug, Default)]
pub struct CommentHeader {
    pub artist: String,
    pub title: String,
    pub album: String,
}

/// Parses packet 1, the comment header: `\x03vorbis` followed by a
/// length-prefixed vendor string and a count-prefixed list of
/// `KEY=VALUE` comments.
pub fn parse_comment_header(packet: &[u8]) -> DemuxResult<CommentHeader> {
    if packet.len() < 11 || &packet[0..7] != b"\x03vorbis" {
        return Err(DemuxError::new(ErrorKind::Format, "not a Vorbis comment header"));
    }
    parse_comment_body(&packet[7..])
}

/// Shared with the Opus comment ("OpusTags") body, which uses the same
/// vendor-string-then-comment-list layout without the codec magic prefix.
pub fn parse_comment_body(body: &[u8]) -> DemuxResult<CommentHeader> {
    let mut pos = 0usize;
    let vendor_len = read_u32_le(body, &mut pos)? as usize;
    pos += vendor_len;
    let comment_count = read_u32_le(body, &mut pos)?;

    let mut out = CommentHeader::default();
    for _ in 0..comment_count {
        let len = read_u32_le(body, &mut pos)? as usize;
        if pos + len > body.len() {
            break;
        }
        let entry = String::from_utf8_lossy(&body[pos..pos + len]);
        pos += len;
        if let Some((key, value)) = entry.split_once('=') {
            match key.to_ascii_uppercase().as_str() {
                "ARTIST" => out.artist = value.to_string(),
                "TITLE" => out.title = value.to_string(),
                "ALBUM" => out.album = value.to_string(),
                _ => {}
            }
        }
    }
    Ok(out)
}

fn read_u32_le(body: &[u8], pos: &mut usize) -> DemuxResult<u32> {
    if *pos + 4 > body.len() {
        return Err(DemuxError::new(ErrorKind::Format, "truncated comment header"));
    }
    let v = u32::from_le_bytes(body[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id_header() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(b"\x01vorbis");
        p.extend_from_slice(&0u32.to_le_bytes()); // version
        p.push(2); // channels
        p.extend_from_slice(&44100u32.to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes()); // max bitrate
        p.extend_from_slice(&128_000i32.to_le_bytes()); // nominal
        p.extend_from_slice(&0i32.to_le_bytes()); // min
        p.push(0xB8); // blocksize byte
        p.push(1); // framing bit
        p
    }

    #[test]
    fn parses_channels_and_rate() {
        let header = parse_id_header(&sample_id_header()).unwrap();
        assert_eq!(header.channels, 2);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.bitrate_nominal, 128_000);
    }

    #[test]
    fn parses_comment_fields() {
        let mut p = Vec::new();
        p.extend_from_slice(b"\x03vorbis");
        let vendor = b"condemux";
        p.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        p.extend_from_slice(vendor);
        p.extend_from_slice(&2u32.to_le_bytes());
        for entry in [&b"ARTIST=Test Artist"[..], &b"TITLE=Test Title"[..]] {
            p.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            p.extend_from_slice(entry);
        }
        let comments = parse_comment_header(&p).unwrap();
        assert_eq!(comments.artist, "Test Artist");
        assert_eq!(comments.title, "Test Title");
    }
}
