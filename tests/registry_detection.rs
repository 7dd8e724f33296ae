//! End-to-end signature detection through the public registry, one fixture
//! per built-in container family.

use condemux::byte_source::MemoryByteSource;
use condemux::registry;

fn riff_wav(data: &[u8]) -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(b"fmt ");
    fmt.extend_from_slice(&16u32.to_le_bytes());
    fmt.extend_from_slice(&1u16.to_le_bytes()); // PCM
    fmt.extend_from_slice(&1u16.to_le_bytes()); // mono
    fmt.extend_from_slice(&8_000u32.to_le_bytes());
    fmt.extend_from_slice(&8_000u32.to_le_bytes());
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&8u16.to_le_bytes());

    let mut chunk = Vec::new();
    chunk.extend_from_slice(b"data");
    chunk.extend_from_slice(&(data.len() as u32).to_le_bytes());
    chunk.extend_from_slice(data);

    let payload_len = (4 + fmt.len() + chunk.len()) as u32;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&payload_len.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(&fmt);
    bytes.extend_from_slice(&chunk);
    bytes
}

fn form_aiff(data: &[u8]) -> Vec<u8> {
    let mut comm = Vec::new();
    comm.extend_from_slice(b"COMM");
    comm.extend_from_slice(&18u32.to_be_bytes());
    comm.extend_from_slice(&1u16.to_be_bytes());
    comm.extend_from_slice(&(data.len() as u32).to_be_bytes());
    comm.extend_from_slice(&8u16.to_be_bytes());
    comm.extend_from_slice(&[0x40, 0x1F, 0xFA, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]); // 8000 Hz

    let mut ssnd = Vec::new();
    ssnd.extend_from_slice(b"SSND");
    ssnd.extend_from_slice(&((8 + data.len()) as u32).to_be_bytes());
    ssnd.extend_from_slice(&0u32.to_be_bytes());
    ssnd.extend_from_slice(&0u32.to_be_bytes());
    ssnd.extend_from_slice(data);

    let payload_len = (4 + comm.len() + ssnd.len()) as u32;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"FORM");
    bytes.extend_from_slice(&payload_len.to_be_bytes());
    bytes.extend_from_slice(b"AIFF");
    bytes.extend_from_slice(&comm);
    bytes.extend_from_slice(&ssnd);
    bytes
}

#[test]
fn registry_detects_wav_by_signature() {
    let bytes = riff_wav(&[0u8; 64]);
    let mut demuxer = registry().create(Box::new(MemoryByteSource::new(bytes))).unwrap();
    demuxer.parse_container().unwrap();
    assert_eq!(demuxer.streams()[0].codec_name, "pcm");
}

#[test]
fn registry_detects_aiff_by_signature() {
    let bytes = form_aiff(&[0u8; 64]);
    let mut demuxer = registry().create(Box::new(MemoryByteSource::new(bytes))).unwrap();
    demuxer.parse_container().unwrap();
    assert_eq!(demuxer.streams()[0].sample_rate, 8_000);
}

#[test]
fn registry_falls_back_to_extension_hint_when_no_signature_matches() {
    // No RIFF/FORM/OggS/ftyp marker anywhere in these bytes, so only the
    // `.wav` extension hint can resolve the format.
    let bytes = vec![0u8; 32];
    let demuxer = registry().create_with_hint(Box::new(MemoryByteSource::new(bytes)), Some("clip.wav"));
    assert!(demuxer.is_ok());
}

#[test]
fn registry_reports_unsupported_for_unknown_bytes() {
    let bytes = vec![0u8; 128];
    let err = registry().create(Box::new(MemoryByteSource::new(bytes))).unwrap_err();
    assert_eq!(err.kind, condemux::ErrorKind::Unsupported);
}

#[test]
fn supported_formats_lists_every_builtin() {
    let formats = registry().supported_formats();
    let ids: Vec<&str> = formats.iter().map(|f| f.format_id.as_str()).collect();
    for expected in ["wav", "aiff", "ogg", "isobmff"] {
        assert!(ids.contains(&expected), "missing format: {expected}");
    }
}
