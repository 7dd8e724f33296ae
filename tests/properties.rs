//! A handful of the universal properties from the error-handling design
//! (parse-idempotence, ordering, EOF consistency), exercised against the
//! public API rather than any one demuxer's internals.

use condemux::byte_source::MemoryByteSource;
use condemux::registry;

fn minimal_wav(total_bytes: usize) -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(b"fmt ");
    fmt.extend_from_slice(&16u32.to_le_bytes());
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&2u16.to_le_bytes());
    fmt.extend_from_slice(&44_100u32.to_le_bytes());
    fmt.extend_from_slice(&176_400u32.to_le_bytes());
    fmt.extend_from_slice(&4u16.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());

    let mut chunk = Vec::new();
    chunk.extend_from_slice(b"data");
    chunk.extend_from_slice(&(total_bytes as u32).to_le_bytes());
    chunk.extend_from_slice(&vec![0u8; total_bytes]);

    let payload_len = (4 + fmt.len() + chunk.len()) as u32;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&payload_len.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(&fmt);
    bytes.extend_from_slice(&chunk);
    bytes
}

/// P1: two demuxer instances opened on identical bytes agree on streams
/// and duration.
#[test]
fn parse_is_idempotent_across_instances() {
    let bytes = minimal_wav(44_100 * 4); // 1 second, stereo 16-bit

    let mut a = registry().create(Box::new(MemoryByteSource::new(bytes.clone()))).unwrap();
    let mut b = registry().create(Box::new(MemoryByteSource::new(bytes))).unwrap();
    a.parse_container().unwrap();
    b.parse_container().unwrap();

    assert_eq!(a.duration_ms(), b.duration_ms());
    assert_eq!(a.streams().len(), b.streams().len());
    assert_eq!(a.streams()[0].codec_name, b.streams()[0].codec_name);
    assert_eq!(a.streams()[0].sample_rate, b.streams()[0].sample_rate);
}

/// P3: timestamps of successive chunks on one stream never decrease.
#[test]
fn chunk_timestamps_are_monotonically_non_decreasing() {
    let bytes = minimal_wav(44_100 * 4 * 3); // a few seconds, several chunks
    let mut demuxer = registry().create(Box::new(MemoryByteSource::new(bytes))).unwrap();
    demuxer.parse_container().unwrap();

    let mut last = 0u64;
    loop {
        let chunk = demuxer.read_chunk().unwrap();
        if chunk.is_empty() {
            break;
        }
        assert!(chunk.timestamp_samples >= last);
        last = chunk.timestamp_samples;
    }
}

/// P5: an empty `read_chunk` implies `is_eof`, and stays that way until a
/// successful seek.
#[test]
fn eof_holds_until_seek() {
    let bytes = minimal_wav(1_000);
    let mut demuxer = registry().create(Box::new(MemoryByteSource::new(bytes))).unwrap();
    demuxer.parse_container().unwrap();

    loop {
        let chunk = demuxer.read_chunk().unwrap();
        if chunk.is_empty() {
            break;
        }
    }
    assert!(demuxer.is_eof());

    let again = demuxer.read_chunk().unwrap();
    assert!(again.is_empty());
    assert!(demuxer.is_eof());

    demuxer.seek_to(0).unwrap();
    assert!(!demuxer.is_eof());
}
