//! Format detection and demuxer construction.
//!
//! Grounded in `DemuxerRegistry.h`: a format_id → factory map, a list of
//! magic-byte signatures, and an extension fallback. The original's
//! process-wide singleton (`getInstance()`) becomes [`global()`], a
//! lazily-initialised static built with `std::sync::OnceLock` rather than
//! a Meyers singleton; registrations still happen once, at first access,
//! via [`crate::formats::register_builtin`].

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::byte_source::ByteSource;
use crate::demuxer::Demuxer;
use crate::error::{DemuxError, DemuxResult, ErrorKind};

/// Constructs a boxed demuxer around a boxed byte source.
pub type DemuxerFactory = fn(Box<dyn ByteSource>) -> Box<dyn Demuxer>;

/// One magic-byte term: `bytes` must match the source's content starting at
/// `offset`. All terms in a [`FormatSignature`] must match.
#[derive(Debug, Clone)]
pub struct SignatureTerm {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

/// A format signature: first match (by registration order) wins.
#[derive(Debug, Clone)]
pub struct FormatSignature {
    pub format_id: String,
    pub terms: Vec<SignatureTerm>,
}

impl FormatSignature {
    /// Convenience constructor for the common case of one literal match at
    /// a fixed offset.
    pub fn literal(format_id: impl Into<String>, offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            format_id: format_id.into(),
            terms: vec![SignatureTerm {
                offset,
                bytes: bytes.into(),
            }],
        }
    }
}

struct Registration {
    format_name: String,
    extensions: Vec<String>,
    factory: DemuxerFactory,
}

/// A format's human-facing metadata, returned by [`Registry::supported_formats`].
#[derive(Debug, Clone)]
pub struct FormatInfo {
    pub format_id: String,
    pub format_name: String,
    pub extensions: Vec<String>,
    pub has_signature: bool,
}

struct Inner {
    formats: HashMap<String, Registration>,
    extension_to_format: HashMap<String, String>,
    signatures: Vec<FormatSignature>,
}

/// Format registry: the `D` component. Reads (`create`) are cheap once
/// formats are registered; registrations take an exclusive lock and are
/// expected only at startup.
pub struct Registry {
    inner: Mutex<Inner>,
}

/// Number of leading bytes probed against registered signatures.
const PROBE_WINDOW: usize = 64;

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Builds an empty registry with no formats registered.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                formats: HashMap::new(),
                extension_to_format: HashMap::new(),
                signatures: Vec::new(),
            }),
        }
    }

    /// Registers a demuxer factory under `format_id`, with its extensions
    /// indexed for fallback detection.
    pub fn register_demuxer(
        &self,
        format_id: impl Into<String>,
        factory: DemuxerFactory,
        format_name: impl Into<String>,
        extensions: &[&str],
    ) {
        let format_id = format_id.into();
        let mut inner = self.inner.lock().unwrap();
        for ext in extensions {
            inner
                .extension_to_format
                .insert(ext.to_lowercase(), format_id.clone());
        }
        inner.formats.insert(
            format_id,
            Registration {
                format_name: format_name.into(),
                extensions: extensions.iter().map(|s| s.to_string()).collect(),
                factory,
            },
        );
    }

    /// Registers a magic-byte signature for an already-registered format.
    pub fn register_signature(&self, signature: FormatSignature) {
        self.inner.lock().unwrap().signatures.push(signature);
    }

    /// Detects the format of `source` by signature, falling back to a raw
    /// passthrough when nothing matches, and constructs the corresponding
    /// demuxer.
    pub fn create(&self, source: Box<dyn ByteSource>) -> DemuxResult<Box<dyn Demuxer>> {
        self.create_with_hint(source, None)
    }

    /// As [`Registry::create`], but prefers `path_hint`'s extension when
    /// signature probing is ambiguous (no match).
    pub fn create_with_hint(
        &self,
        mut source: Box<dyn ByteSource>,
        path_hint: Option<&str>,
    ) -> DemuxResult<Box<dyn Demuxer>> {
        let mut probe = [0u8; PROBE_WINDOW];
        let n = source.read(&mut probe)?;
        source.seek(0, crate::byte_source::SeekOrigin::Start)?;

        let format_id = {
            let inner = self.inner.lock().unwrap();
            Self::probe_format(&inner, &probe[..n]).or_else(|| {
                path_hint
                    .and_then(Self::extension_of)
                    .and_then(|ext| inner.extension_to_format.get(&ext).cloned())
            })
        };

        let Some(format_id) = format_id else {
            return Err(DemuxError::new(
                ErrorKind::Unsupported,
                "no registered format matched this source",
            ));
        };

        let inner = self.inner.lock().unwrap();
        let registration = inner.formats.get(&format_id).ok_or_else(|| {
            DemuxError::new(ErrorKind::Unsupported, format!("format '{format_id}' not registered"))
        })?;
        Ok((registration.factory)(source))
    }

    fn probe_format(inner: &Inner, probe: &[u8]) -> Option<String> {
        inner
            .signatures
            .iter()
            .find(|sig| {
                sig.terms
                    .iter()
                    .all(|term| Self::term_matches(probe, term))
            })
            .map(|sig| sig.format_id.clone())
    }

    fn term_matches(probe: &[u8], term: &SignatureTerm) -> bool {
        let end = term.offset + term.bytes.len();
        end <= probe.len() && probe[term.offset..end] == term.bytes[..]
    }

    fn extension_of(path: &str) -> Option<String> {
        std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Lists every registered format with its name, extensions, and
    /// whether a signature has been registered for it.
    pub fn supported_formats(&self) -> Vec<FormatInfo> {
        let inner = self.inner.lock().unwrap();
        inner
            .formats
            .iter()
            .map(|(id, reg)| FormatInfo {
                format_id: id.clone(),
                format_name: reg.format_name.clone(),
                extensions: reg.extensions.clone(),
                has_signature: inner.signatures.iter().any(|s| &s.format_id == id),
            })
            .collect()
    }

    /// `true` if `format_id` has a registered factory.
    pub fn is_format_supported(&self, format_id: &str) -> bool {
        self.inner.lock().unwrap().formats.contains_key(format_id)
    }

    /// `true` if `extension` (case-insensitive, no leading dot) maps to a
    /// registered format.
    pub fn is_extension_supported(&self, extension: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .extension_to_format
            .contains_key(&extension.to_lowercase())
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, with every built-in container format
/// registered on first access.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(|| {
        let registry = Registry::new();
        crate::formats::register_builtin(&registry);
        registry
    })
}
