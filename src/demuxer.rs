//! The [`Demuxer`] trait: the uniform surface every container-specific
//! parser implements.
//!
//! Grounded in `Demuxer.h`'s abstract base class. The original's mutex-
//! guarded fields (`m_last_error`, `m_eof_flag`, `m_parsed`, ...) become
//! plain fields behind `&mut self` here — per-instance single-threaded
//! cooperative use (spec §5) means a demuxer itself needs no internal
//! locking; only the process-wide [`crate::registry::Registry`] and
//! [`crate::buffer_pool::BufferPool`] do.

use crate::chunk::{MediaChunk, StreamInfo};
use crate::common::StreamId;
use crate::error::{DemuxError, DemuxResult, ErrorStats, RecoveryHint};

/// Container-agnostic surface for reading streams out of a parsed
/// container.
///
/// `parse_container` must be called, and succeed, before any other method;
/// implementations document this with a debug assertion rather than a
/// runtime check, since it mirrors the original's precondition contracts.
pub trait Demuxer {
    /// Parses structural headers, enumerates streams, and builds whatever
    /// internal index (chunk list, page table, sample table) the format
    /// needs for reading. Call at most once.
    fn parse_container(&mut self) -> DemuxResult<()>;

    /// All streams discovered by `parse_container`. Empty before parsing.
    fn streams(&self) -> &[StreamInfo];

    /// Looks up one stream's descriptor by id.
    fn stream_info(&self, stream_id: StreamId) -> Option<&StreamInfo> {
        self.streams().iter().find(|s| s.stream_id == stream_id)
    }

    /// Reads the next chunk from any stream, in container-defined
    /// interleave order. An invalid (empty) chunk signals EOF.
    fn read_chunk(&mut self) -> DemuxResult<MediaChunk>;

    /// Reads the next chunk belonging specifically to `stream_id`.
    fn read_chunk_for_stream(&mut self, stream_id: StreamId) -> DemuxResult<MediaChunk>;

    /// Seeks to `timestamp_ms`, clamped to `[0, duration_ms()]`. The next
    /// `read_chunk` call returns the earliest eligible chunk per the
    /// container's seek semantics.
    fn seek_to(&mut self, timestamp_ms: u64) -> DemuxResult<()>;

    /// `true` once every stream has been read to its end.
    fn is_eof(&self) -> bool;

    /// Total duration in milliseconds, `0` if unknown.
    fn duration_ms(&self) -> u64;

    /// Current playback position in milliseconds.
    fn position_ms(&self) -> u64;

    /// Last known granule position for `stream_id`; `0` for non-Ogg
    /// formats, matching the base class's default.
    fn granule_position(&self, stream_id: StreamId) -> u64 {
        let _ = stream_id;
        0
    }

    /// Per-category counts of errors this instance has recovered from.
    fn error_stats(&self) -> &ErrorStats;

    /// Dispatches `hint` to the matching recovery hook, returning whether
    /// recovery succeeded.
    fn attempt_recovery(&mut self, hint: RecoveryHint) -> bool {
        match hint {
            RecoveryHint::None => false,
            RecoveryHint::SkipSection => self.skip_to_next_valid_section(),
            RecoveryHint::ResetState => self.reset_internal_state(),
            RecoveryHint::FallbackMode => self.enable_fallback_mode(),
        }
    }

    /// Scans forward for the next plausible section header. Default: no
    /// recovery, as in the base class.
    fn skip_to_next_valid_section(&mut self) -> bool {
        false
    }

    /// Resets parser state to recover from a desynchronised stream.
    fn reset_internal_state(&mut self) -> bool {
        false
    }

    /// Switches to a degraded parsing mode that synthesises missing
    /// structure.
    fn enable_fallback_mode(&mut self) -> bool {
        false
    }
}

/// Validates that `stream_id` names one of `streams`, returning a
/// [`DemuxError`] otherwise. Shared by every concrete demuxer's
/// `read_chunk_for_stream` implementation.
pub fn require_known_stream(streams: &[StreamInfo], stream_id: StreamId) -> DemuxResult<()> {
    if streams.iter().any(|s| s.stream_id == stream_id) {
        Ok(())
    } else {
        Err(DemuxError::new(
            crate::error::ErrorKind::Validation,
            format!("unknown stream id {stream_id}"),
        ))
    }
}
