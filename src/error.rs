//! Error taxonomy shared by every byte source and demuxer.
//!
//! All fallible operations in this crate return a [`DemuxError`], which
//! carries enough context (`category`, `file_offset`, `recovery`) for a
//! demuxer to decide whether to retry, or for a caller to report a useful
//! diagnostic. Demuxers do not format human-facing strings for UI; that is
//! left to downstream components, per the crate's error handling design.

use std::collections::HashMap;
use std::fmt;

/// Broad category of a failure, used both for dispatch and for the
/// per-demuxer error statistics exposed by [`crate::Demuxer::error_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The underlying byte source failed (I/O error, socket reset, ...).
    Io,
    /// A structural violation of the container format.
    Format,
    /// A valid container using a codec/profile this build does not implement.
    Unsupported,
    /// Allocation failure; triggers a buffer pool purge and a single retry.
    Memory,
    /// A size, offset, or table value was internally inconsistent.
    Validation,
    /// The byte source or demuxer was used after `close()`/consumption.
    Closed,
    /// An HTTP request exhausted its retry budget.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Io => "io",
            ErrorKind::Format => "format",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Memory => "memory",
            ErrorKind::Validation => "validation",
            ErrorKind::Closed => "closed",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// A suggested, mechanical response to an error, dispatched by
/// [`crate::Demuxer::attempt_recovery`] to the demuxer's recovery hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryHint {
    /// No recovery is possible; the error is terminal for this call.
    None,
    /// Skip the offending section and resume parsing past it.
    SkipSection,
    /// Reset internal parser state (e.g. after a desynchronised page/box
    /// stream) and resume from the current position.
    ResetState,
    /// Fall back to a degraded parsing mode that synthesises missing data.
    FallbackMode,
}

/// The crate's single error type.
///
/// `file_offset` is `None` when the error is not associated with a specific
/// byte position (e.g. a `Memory` error raised before any read).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}{offset}", offset = format_offset(*file_offset))]
pub struct DemuxError {
    /// The error category.
    pub kind: ErrorKind,
    /// Human-readable (but not UI-facing) description.
    pub message: String,
    /// Byte offset in the source where the error was detected, if known.
    pub file_offset: Option<u64>,
    /// The recovery hint a demuxer should attempt before surfacing this.
    pub recovery: RecoveryHint,
}

fn format_offset(offset: Option<u64>) -> String {
    match offset {
        Some(o) => format!(" (at offset {o})"),
        None => String::new(),
    }
}

impl DemuxError {
    /// Builds a new error with no associated offset and [`RecoveryHint::None`].
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file_offset: None,
            recovery: RecoveryHint::None,
        }
    }

    /// Attaches a byte offset to this error.
    #[must_use]
    pub fn at(mut self, offset: u64) -> Self {
        self.file_offset = Some(offset);
        self
    }

    /// Attaches a recovery hint to this error.
    #[must_use]
    pub fn with_recovery(mut self, recovery: RecoveryHint) -> Self {
        self.recovery = recovery;
        self
    }

    /// Shorthand for a [`ErrorKind::Format`] error with [`RecoveryHint::SkipSection`].
    pub fn format_recoverable(message: impl Into<String>, offset: u64) -> Self {
        Self::new(ErrorKind::Format, message)
            .at(offset)
            .with_recovery(RecoveryHint::SkipSection)
    }

    /// Shorthand for a fatal [`ErrorKind::Format`] error.
    pub fn format_fatal(message: impl Into<String>, offset: u64) -> Self {
        Self::new(ErrorKind::Format, message).at(offset)
    }
}

impl From<std::io::Error> for DemuxError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::Io,
            std::io::ErrorKind::PermissionDenied => ErrorKind::Io,
            _ => ErrorKind::Io,
        };
        Self::new(kind, err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type DemuxResult<T> = Result<T, DemuxError>;

/// Per-demuxer tally of recovered errors, keyed by category.
///
/// Exposed via [`crate::Demuxer::error_stats`] so callers can distinguish a
/// clean parse from one that limped through several recoveries (P6).
#[derive(Debug, Default, Clone)]
pub struct ErrorStats {
    counts: HashMap<ErrorKind, u64>,
}

impl ErrorStats {
    /// Creates an empty statistics map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one occurrence of `kind`, logging at `warn` when the
    /// `tracing` feature is enabled.
    pub fn record(&mut self, kind: ErrorKind, message: &str, offset: Option<u64>) {
        *self.counts.entry(kind).or_insert(0) += 1;
        #[cfg(feature = "tracing")]
        tracing::warn!(
            kind = %kind,
            offset = offset.unwrap_or(0),
            "recovered: {message}"
        );
        #[cfg(not(feature = "tracing"))]
        {
            let _ = (message, offset);
        }
    }

    /// Returns the number of times `kind` has been recorded.
    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Returns an iterator over all recorded `(kind, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&ErrorKind, &u64)> {
        self.counts.iter()
    }

    /// Total number of recovered errors across all categories.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}
