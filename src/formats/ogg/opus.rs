//! Opus header packet parsing (RFC 7845).

use crate::error::{DemuxError, DemuxResult, ErrorKind};

pub const HEADERS_NEEDED: u32 = 2;
/// Opus audio is always decoded at this rate regardless of the
/// informational `input_sample_rate` field.
pub const PLAYBACK_SAMPLE_RATE: u32 = 48_000;

#[derive(Debug, Default)]
pub struct IdHeader {
    pub channels: u16,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
}

/// Parses the `OpusHead` identification header (packet 0).
pub fn parse_id_header(packet: &[u8]) -> DemuxResult<IdHeader> {
    if packet.len() < 19 || &packet[0..8] != b"OpusHead" {
        return Err(DemuxError::new(ErrorKind::Format, "not an OpusHead packet"));
    }
    let channels = packet[9] as u16;
    let pre_skip = u16::from_le_bytes(packet[10..12].try_into().unwrap());
    let input_sample_rate = u32::from_le_bytes(packet[12..16].try_into().unwrap());
    Ok(IdHeader {
        channels,
        pre_skip,
        input_sample_rate,
    })
}

/// `true` if `packet` opens with the `OpusTags` magic.
pub fn is_comment_packet(packet: &[u8]) -> bool {
    packet.len() >= 8 && &packet[0..8] == b"OpusTags"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_opus_head() {
        let mut p = Vec::new();
        p.extend_from_slice(b"OpusHead");
        p.push(1); // version
        p.push(2); // channels
        p.extend_from_slice(&312u16.to_le_bytes()); // pre-skip
        p.extend_from_slice(&48_000u32.to_le_bytes());
        p.extend_from_slice(&0i16.to_le_bytes()); // output gain
        p.push(0); // channel mapping family
        let header = parse_id_header(&p).unwrap();
        assert_eq!(header.channels, 2);
        assert_eq!(header.pre_skip, 312);
    }
}
