//! `stbl` sample-table reconstruction: turns the five (or six, with `ctts`)
//! sample-table boxes into a flat per-sample index of
//! `(file offset, size, decode time, sync flag)`.
//!
//! There is no `original_source/` file for the non-fragmented sample table
//! (only the fragment handler survived in the retrieval pack), so the
//! reconstruction algorithm below follows `spec.md` §4.G's five-step
//! description directly.

use crate::error::ErrorKind;
use crate::error::ErrorStats;

/// A frame length assumed for audio when `stts` is missing or a track's
/// sample size when `stsz` is missing, mirroring the fragment handler's
/// `SetDefaultValues` default of 1024 for audio.
pub const DEFAULT_FRAME_LENGTH: u32 = 1024;
pub const DEFAULT_SAMPLE_SIZE: u32 = 1024;

#[derive(Debug, Clone, Copy)]
pub struct SttsEntry {
    pub count: u32,
    pub delta: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

#[derive(Debug, Clone)]
pub enum SampleSizes {
    Fixed { size: u32, count: u32 },
    PerSample(Vec<u32>),
}

impl SampleSizes {
    fn len(&self) -> u32 {
        match self {
            SampleSizes::Fixed { count, .. } => *count,
            SampleSizes::PerSample(v) => v.len() as u32,
        }
    }

    fn size_of(&self, index: u32) -> u32 {
        match self {
            SampleSizes::Fixed { size, .. } => *size,
            SampleSizes::PerSample(v) => v.get(index as usize).copied().unwrap_or(DEFAULT_SAMPLE_SIZE),
        }
    }
}

/// Raw contents of one track's `stbl`, parsed but not yet reconciled into
/// a per-sample index.
#[derive(Debug, Clone, Default)]
pub struct SampleTables {
    pub stts: Vec<SttsEntry>,
    pub stsc: Vec<StscEntry>,
    pub sample_sizes: Option<SampleSizes>,
    pub chunk_offsets: Vec<u64>,
    /// 1-based sample numbers marked as sync samples; `None` means every
    /// sample is a sync sample (no `stss` present).
    pub sync_samples: Option<std::collections::HashSet<u32>>,
}

/// One reconstructed sample.
#[derive(Debug, Clone, Copy)]
pub struct SampleEntry {
    pub offset: u64,
    pub size: u32,
    pub decode_time: u64,
    pub is_sync: bool,
}

/// Runs the five-step reconstruction algorithm, applying the documented
/// recovery behaviors for missing tables, non-monotonic `stts`, and
/// invalid chunk offsets.
pub fn build_sample_index(tables: &mut SampleTables, errors: &mut ErrorStats) -> Vec<SampleEntry> {
    if tables.chunk_offsets.is_empty() {
        return Vec::new();
    }

    if tables.stsc.is_empty() {
        errors.record(ErrorKind::Validation, "missing stsc; inferring one sample per chunk", None);
        tables.stsc.push(StscEntry {
            first_chunk: 1,
            samples_per_chunk: 1,
            sample_description_index: 1,
        });
    }

    let total_samples = total_sample_count(tables);

    let sizes = tables.sample_sizes.get_or_insert_with(|| {
        errors.record(ErrorKind::Validation, "missing stsz; inferring fixed sample size", None);
        SampleSizes::Fixed {
            size: DEFAULT_SAMPLE_SIZE,
            count: total_samples,
        }
    });

    if tables.stts.is_empty() {
        errors.record(ErrorKind::Validation, "missing stts; inferring uniform frame length", None);
        tables.stts.push(SttsEntry {
            count: total_samples.max(sizes.len()),
            delta: DEFAULT_FRAME_LENGTH,
        });
    }

    let offsets = offsets_per_sample(tables, errors);
    let decode_times = decode_times_per_sample(&tables.stts, offsets.len() as u32, errors);

    let mut out = Vec::with_capacity(offsets.len());
    for (i, offset) in offsets.into_iter().enumerate() {
        let idx = i as u32;
        let size = sizes.size_of(idx);
        let decode_time = decode_times.get(i).copied().unwrap_or(0);
        let is_sync = tables
            .sync_samples
            .as_ref()
            .map(|set| set.contains(&(idx + 1)))
            .unwrap_or(true);
        out.push(SampleEntry {
            offset,
            size,
            decode_time,
            is_sync,
        });
    }
    out
}

fn total_sample_count(tables: &SampleTables) -> u32 {
    if let Some(sizes) = &tables.sample_sizes {
        return sizes.len();
    }
    // Without stsz, approximate from stsc applied across all chunks.
    samples_per_chunk_table(tables, tables.chunk_offsets.len() as u32)
        .iter()
        .sum()
}

/// Expands `stsc` into a per-chunk sample count, one entry per chunk in
/// `chunk_offsets`.
fn samples_per_chunk_table(tables: &SampleTables, chunk_count: u32) -> Vec<u32> {
    let mut out = vec![0u32; chunk_count as usize];
    let mut entries = tables.stsc.iter().peekable();
    let mut current = entries.next();
    let mut next_boundary = entries.peek().map(|e| e.first_chunk);

    for (i, slot) in out.iter_mut().enumerate() {
        let chunk_number = i as u32 + 1;
        while let Some(boundary) = next_boundary {
            if chunk_number >= boundary {
                current = entries.next();
                next_boundary = entries.peek().map(|e| e.first_chunk);
            } else {
                break;
            }
        }
        *slot = current.map(|e| e.samples_per_chunk).unwrap_or(0);
    }
    out
}

/// Step 1 + 2: walks chunks in order, advancing each chunk's running
/// sample offset by the per-sample size taken from `stsz`/`stz2`.
fn offsets_per_sample(tables: &mut SampleTables, errors: &mut ErrorStats) -> Vec<u64> {
    let chunk_count = tables.chunk_offsets.len() as u32;
    let per_chunk_counts = samples_per_chunk_table(tables, chunk_count);

    let sizes = tables.sample_sizes.clone().unwrap_or(SampleSizes::Fixed {
        size: DEFAULT_SAMPLE_SIZE,
        count: per_chunk_counts.iter().sum(),
    });

    let average_chunk_size: u64 = {
        let total: u64 = (0..sizes.len()).map(|i| sizes.size_of(i) as u64).sum();
        if sizes.len() == 0 {
            DEFAULT_SAMPLE_SIZE as u64
        } else {
            (total / sizes.len() as u64).max(1)
        }
    };

    let mut offsets = Vec::new();
    let mut sample_idx = 0u32;
    let mut last_valid_offset: Option<u64> = None;

    for (chunk_idx, &declared_offset) in tables.chunk_offsets.clone().iter().enumerate() {
        let mut base = declared_offset;
        let implausible = declared_offset == 0 && chunk_idx != 0;
        if implausible {
            if let Some(prev) = last_valid_offset {
                errors.record(
                    ErrorKind::Validation,
                    "invalid chunk offset; patched from previous offset plus average chunk size",
                    None,
                );
                base = prev + average_chunk_size;
                tables.chunk_offsets[chunk_idx] = base;
            } else {
                errors.record(ErrorKind::Validation, "invalid chunk offset with no prior baseline; dropping chunk", None);
                sample_idx += per_chunk_counts.get(chunk_idx).copied().unwrap_or(0);
                continue;
            }
        }
        last_valid_offset = Some(base);

        let count = per_chunk_counts.get(chunk_idx).copied().unwrap_or(0);
        let mut running = base;
        for _ in 0..count {
            offsets.push(running);
            running += sizes.size_of(sample_idx) as u64;
            sample_idx += 1;
        }
    }
    offsets
}

/// Step 3: expands `stts` (count, delta) runs into a per-sample decode
/// time, patching non-monotonic entries as they're discovered.
fn decode_times_per_sample(stts: &[SttsEntry], sample_count: u32, errors: &mut ErrorStats) -> Vec<u64> {
    let mut out = Vec::with_capacity(sample_count as usize);
    let mut time = 0u64;
    let mut last_delta = 0u64;

    'entries: for entry in stts {
        let mut delta = entry.delta as u64;
        if out.len() as u32 >= sample_count {
            break;
        }
        for _ in 0..entry.count {
            if out.len() as u32 >= sample_count {
                break 'entries;
            }
            let candidate = time;
            if let Some(&prev) = out.last() {
                if candidate < prev {
                    errors.record(ErrorKind::Validation, "non-monotonic stts entry; patched from previous delta", None);
                    delta = last_delta;
                    time = prev + delta;
                    out.push(time);
                    last_delta = delta;
                    time += delta;
                    continue;
                }
            }
            out.push(candidate);
            time += delta;
            last_delta = delta;
        }
    }

    while (out.len() as u32) < sample_count {
        let next = out.last().copied().unwrap_or(0) + last_delta.max(1);
        out.push(next);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstructs_fixed_size_single_chunk_run() {
        let mut tables = SampleTables {
            stts: vec![SttsEntry { count: 10, delta: 1024 }],
            stsc: vec![StscEntry {
                first_chunk: 1,
                samples_per_chunk: 1,
                sample_description_index: 1,
            }],
            sample_sizes: Some(SampleSizes::Fixed { size: 256, count: 10 }),
            chunk_offsets: (0..10).map(|i| 1000 + i * 256).collect(),
            sync_samples: None,
        };
        let mut errors = ErrorStats::new();
        let samples = build_sample_index(&mut tables, &mut errors);
        assert_eq!(samples.len(), 10);
        assert_eq!(samples[0].decode_time, 0);
        assert_eq!(samples[1].decode_time, 1024);
        assert_eq!(samples[9].decode_time, 9 * 1024);
        assert!(samples.iter().all(|s| s.size == 256));
        assert!(samples.iter().all(|s| s.is_sync));
        assert_eq!(samples[3].offset, 1000 + 3 * 256);
    }

    #[test]
    fn missing_tables_synthesize_defaults() {
        let mut tables = SampleTables {
            stts: Vec::new(),
            stsc: Vec::new(),
            sample_sizes: None,
            chunk_offsets: vec![2000, 2256, 2512],
            sync_samples: None,
        };
        let mut errors = ErrorStats::new();
        let samples = build_sample_index(&mut tables, &mut errors);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].size, DEFAULT_SAMPLE_SIZE);
        assert!(errors.count(ErrorKind::Validation) >= 3);
    }

    #[test]
    fn invalid_chunk_offset_patched_from_previous() {
        let mut tables = SampleTables {
            stts: vec![SttsEntry { count: 3, delta: 1024 }],
            stsc: vec![StscEntry {
                first_chunk: 1,
                samples_per_chunk: 1,
                sample_description_index: 1,
            }],
            sample_sizes: Some(SampleSizes::Fixed { size: 100, count: 3 }),
            chunk_offsets: vec![500, 0, 700],
            sync_samples: None,
        };
        let mut errors = ErrorStats::new();
        let samples = build_sample_index(&mut tables, &mut errors);
        assert_eq!(samples[1].offset, 600); // 500 + average(100) patched
        assert!(errors.count(ErrorKind::Validation) >= 1);
    }
}
