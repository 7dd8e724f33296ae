//! Fragmented MP4 support: `moof`/`mfhd`/`traf`/`tfhd`/`trun`/`tfdt`.
//!
//! Grounded directly on `ISODemuxerFragmentHandler.cpp`'s
//! `ParseMovieFragmentBox`/`ParseTrackFragmentBox`/`ParseTrackFragmentRun`
//! family: same box walk, same flag-bit semantics, same base-data-offset
//! and running-sample-offset arithmetic, translated into owned Rust
//! structs instead of an in-place parse tree.

use std::collections::HashMap;

use super::{be32, be64, BoxEntry};
use crate::byte_source::{ByteSource, SeekOrigin};
use crate::error::{DemuxResult, ErrorKind, ErrorStats};

pub const TFHD_BASE_DATA_OFFSET: u32 = 0x0000_01;
pub const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x0000_02;
pub const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x0000_08;
pub const TFHD_DEFAULT_SAMPLE_SIZE: u32 = 0x0000_10;
pub const TFHD_DEFAULT_SAMPLE_FLAGS: u32 = 0x0000_20;

pub const TRUN_DATA_OFFSET: u32 = 0x0000_01;
pub const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x0000_04;
pub const TRUN_SAMPLE_DURATION: u32 = 0x0000_100;
pub const TRUN_SAMPLE_SIZE: u32 = 0x0000_200;
pub const TRUN_SAMPLE_FLAGS: u32 = 0x0000_400;
pub const TRUN_SAMPLE_COMPOSITION_TIME_OFFSET: u32 = 0x0000_800;

/// Per-track defaults from `mvex`/`trex`, mirroring `SetDefaultValues`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackFragmentDefaults {
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TrackRun {
    pub sample_count: u32,
    pub data_offset: i32,
    pub first_sample_flags: Option<u32>,
    pub durations: Vec<u32>,
    pub sizes: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct TrackFragment {
    pub track_id: u32,
    pub base_data_offset: u64,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    /// `None` when the `traf` carried no `tfdt`; the caller resolves this
    /// against the track's previous fragment once fragments are ordered by
    /// sequence number, since file order and sequence order can differ.
    pub decode_time: Option<u64>,
    pub runs: Vec<TrackRun>,
}

#[derive(Debug, Clone)]
pub struct MovieFragment {
    pub moof_offset: u64,
    pub sequence_number: u32,
    pub tracks: Vec<TrackFragment>,
}

fn read_payload(source: &mut dyn ByteSource, entry: &BoxEntry) -> DemuxResult<Vec<u8>> {
    source.seek(entry.payload_offset as i64, SeekOrigin::Start)?;
    let mut buf = vec![0u8; entry.payload_size as usize];
    source.read_exact(&mut buf)?;
    Ok(buf)
}

/// Mirrors `ParseMovieFragmentHeader`: version/flags(4) + sequence_number(4).
fn parse_mfhd(payload: &[u8]) -> u32 {
    if payload.len() < 8 {
        return 0;
    }
    be32(payload, 4)
}

/// Mirrors `ParseTrackFragmentHeader`: version/flags(4) + track_id(4), then
/// the optional fields gated by the flag bits, in their fixed box order.
/// `track_id` is read before defaults are looked up, since the matching
/// `trex` entry (or this crate's synthetic stand-in) is keyed by it.
fn parse_tfhd(payload: &[u8], moof_offset: u64, defaults_by_track: &HashMap<u32, TrackFragmentDefaults>) -> TrackFragment {
    let flags = if payload.len() >= 4 { be32(payload, 0) & 0x00FF_FFFF } else { 0 };
    let track_id = if payload.len() >= 8 { be32(payload, 4) } else { 0 };
    let defaults = defaults_by_track.get(&track_id).copied().unwrap_or_default();
    let mut cursor = 8usize;

    let mut base_data_offset = moof_offset;
    if flags & TFHD_BASE_DATA_OFFSET != 0 && payload.len() >= cursor + 8 {
        base_data_offset = be64(payload, cursor);
        cursor += 8;
    }
    if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 && payload.len() >= cursor + 4 {
        cursor += 4;
    }
    let mut default_sample_duration = defaults.default_sample_duration;
    if flags & TFHD_DEFAULT_SAMPLE_DURATION != 0 && payload.len() >= cursor + 4 {
        default_sample_duration = be32(payload, cursor);
        cursor += 4;
    }
    let mut default_sample_size = defaults.default_sample_size;
    if flags & TFHD_DEFAULT_SAMPLE_SIZE != 0 && payload.len() >= cursor + 4 {
        default_sample_size = be32(payload, cursor);
        cursor += 4;
    }
    // default_sample_flags, if present, isn't tracked further: this demuxer
    // reports sync via stss-equivalent inference instead.

    TrackFragment {
        track_id,
        base_data_offset,
        default_sample_duration,
        default_sample_size,
        decode_time: None,
        runs: Vec::new(),
    }
}

/// Mirrors `ParseTrackFragmentDecodeTime`: version(1) selects a 32- or
/// 64-bit base media decode time.
fn parse_tfdt(payload: &[u8]) -> u64 {
    if payload.is_empty() {
        return 0;
    }
    let version = payload[0];
    if version == 1 && payload.len() >= 12 {
        be64(payload, 4)
    } else if payload.len() >= 8 {
        be32(payload, 4) as u64
    } else {
        0
    }
}

/// Mirrors `ParseTrackFragmentRun`: version/flags(4) + sample_count(4),
/// then the optional data_offset/first_sample_flags fields, then one
/// record per sample built from whichever of duration/size/flags/cts the
/// flags select, in that fixed order.
fn parse_trun(payload: &[u8]) -> TrackRun {
    if payload.len() < 8 {
        return TrackRun::default();
    }
    let flags = be32(payload, 0) & 0x00FF_FFFF;
    let sample_count = be32(payload, 4);
    let mut cursor = 8usize;

    let mut data_offset = 0i32;
    if flags & TRUN_DATA_OFFSET != 0 && payload.len() >= cursor + 4 {
        data_offset = be32(payload, cursor) as i32;
        cursor += 4;
    }
    let mut first_sample_flags = None;
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 && payload.len() >= cursor + 4 {
        first_sample_flags = Some(be32(payload, cursor));
        cursor += 4;
    }

    let mut durations = Vec::with_capacity(sample_count as usize);
    let mut sizes = Vec::with_capacity(sample_count as usize);
    for _ in 0..sample_count {
        if flags & TRUN_SAMPLE_DURATION != 0 {
            if payload.len() < cursor + 4 {
                break;
            }
            durations.push(be32(payload, cursor));
            cursor += 4;
        }
        if flags & TRUN_SAMPLE_SIZE != 0 {
            if payload.len() < cursor + 4 {
                break;
            }
            sizes.push(be32(payload, cursor));
            cursor += 4;
        }
        if flags & TRUN_SAMPLE_FLAGS != 0 {
            if payload.len() < cursor + 4 {
                break;
            }
            cursor += 4;
        }
        if flags & TRUN_SAMPLE_COMPOSITION_TIME_OFFSET != 0 {
            if payload.len() < cursor + 4 {
                break;
            }
            cursor += 4;
        }
    }

    TrackRun {
        sample_count,
        data_offset,
        first_sample_flags,
        durations,
        sizes,
    }
}

/// Mirrors `ParseTrackFragmentBox`: walks a `traf`'s children, dispatching
/// `tfhd`/`tfdt`/`trun` in whatever order they appear (the spec allows
/// more than one `trun` per `traf`).
fn parse_traf(
    source: &mut dyn ByteSource,
    entry: &BoxEntry,
    moof_offset: u64,
    defaults_by_track: &HashMap<u32, TrackFragmentDefaults>,
    errors: &mut ErrorStats,
) -> DemuxResult<Option<TrackFragment>> {
    let children = super::walk_boxes(source, entry.payload_offset, entry.payload_offset + entry.payload_size, errors)?;
    let mut fragment: Option<TrackFragment> = None;
    let mut decode_time = None;
    let mut runs = Vec::new();

    for child in &children {
        match &child.fourcc {
            b"tfhd" => {
                let payload = read_payload(source, child)?;
                fragment = Some(parse_tfhd(&payload, moof_offset, defaults_by_track));
            }
            b"tfdt" => {
                let payload = read_payload(source, child)?;
                decode_time = Some(parse_tfdt(&payload));
            }
            b"trun" => {
                let payload = read_payload(source, child)?;
                runs.push(parse_trun(&payload));
            }
            _ => {}
        }
    }

    let Some(mut fragment) = fragment else {
        errors.record(ErrorKind::Validation, "traf without tfhd; skipping fragment track", Some(entry.payload_offset));
        return Ok(None);
    };
    if decode_time.is_none() {
        errors.record(
            ErrorKind::Validation,
            "traf without tfdt; carrying forward previous fragment's decode time",
            Some(entry.payload_offset),
        );
    }
    fragment.decode_time = decode_time;
    fragment.runs = runs;
    Ok(Some(fragment))
}

/// Mirrors `ParseMovieFragmentBox`: reads `mfhd` for the sequence number,
/// then one `TrackFragment` per `traf` child.
pub fn parse_moof(
    source: &mut dyn ByteSource,
    moof: &BoxEntry,
    defaults_by_track: &HashMap<u32, TrackFragmentDefaults>,
    errors: &mut ErrorStats,
) -> DemuxResult<MovieFragment> {
    let children = super::walk_boxes(source, moof.payload_offset, moof.payload_offset + moof.payload_size, errors)?;
    let mut sequence_number = 0;
    let mut tracks = Vec::new();

    for child in &children {
        match &child.fourcc {
            b"mfhd" => {
                let payload = read_payload(source, child)?;
                sequence_number = parse_mfhd(&payload);
            }
            b"traf" => {
                if let Some(track) = parse_traf(source, child, moof.box_start, defaults_by_track, errors)? {
                    tracks.push(track);
                }
            }
            _ => {}
        }
    }

    Ok(MovieFragment {
        moof_offset: moof.box_start,
        sequence_number,
        tracks,
    })
}

/// `ParseMovieFragmentBox`'s sibling `CompareFragmentsBySequence`: orders
/// fragments by `mfhd` sequence number for interleaved playback, and
/// reports any sequence gaps so the caller can log them rather than
/// silently presenting a shortened timeline (`HasMissingFragments` /
/// `FillMissingFragmentGaps`).
pub fn reorder_fragments(mut fragments: Vec<MovieFragment>, errors: &mut ErrorStats) -> Vec<MovieFragment> {
    fragments.sort_by_key(|f| f.sequence_number);
    for pair in fragments.windows(2) {
        let gap = pair[1].sequence_number.saturating_sub(pair[0].sequence_number);
        if gap > 1 {
            errors.record(
                ErrorKind::Validation,
                &format!("missing fragment sequence(s) between {} and {}", pair[0].sequence_number, pair[1].sequence_number),
                Some(pair[1].moof_offset),
            );
        }
    }
    fragments
}

/// A concrete, resolved sample drawn from a fragment's `trun` records,
/// with `ParseTrackFragmentRun`'s base-data-offset/data-offset/running-size
/// arithmetic already applied.
#[derive(Debug, Clone, Copy)]
pub struct FragmentSample {
    pub offset: u64,
    pub size: u32,
    pub decode_time: u64,
    pub is_sync: bool,
}

/// Expands one track fragment's `trun` records into concrete samples,
/// starting from `start_decode_time` (the resolved `tfdt`, or the previous
/// fragment's final decode time carried forward when `tfdt` was absent).
/// Mirrors `ExtractFragmentSample` and the offset formula documented in
/// `UpdateSampleTables`: the running data pointer starts at
/// `tfhd.base_data_offset` (or the `moof` offset if absent), is bumped
/// once by `trun.data_offset` if present, then advances by each sample's
/// resolved size. Returns the samples together with the decode time one
/// past the fragment's last sample, for the next fragment to carry forward.
pub fn expand_track_samples(fragment: &TrackFragment, start_decode_time: u64) -> (Vec<FragmentSample>, u64) {
    let mut samples = Vec::new();
    let mut decode_time = start_decode_time;

    for run in &fragment.runs {
        let mut offset = fragment.base_data_offset;
        offset = offset.wrapping_add(run.data_offset as i64 as u64);
        for i in 0..run.sample_count {
            let size = run.sizes.get(i as usize).copied().unwrap_or(fragment.default_sample_size);
            let duration = run.durations.get(i as usize).copied().unwrap_or(fragment.default_sample_duration);
            let is_sync = if i == 0 {
                run.first_sample_flags.map(|f| (f >> 16) & 0x1 == 0).unwrap_or(true)
            } else {
                true
            };
            samples.push(FragmentSample {
                offset,
                size,
                decode_time,
                is_sync,
            });
            offset += size as u64;
            decode_time += duration as u64;
        }
    }
    (samples, decode_time)
}
