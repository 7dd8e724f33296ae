//! Built-in container formats and their registration with
//! [`crate::registry::Registry`].

pub mod chunk;
pub mod iso;
pub mod ogg;

use crate::registry::{FormatSignature, Registry};

/// Registers every format compiled into this build. Called once, lazily,
/// by [`crate::registry::global`].
pub fn register_builtin(registry: &Registry) {
    #[cfg(any(feature = "wav", feature = "aiff"))]
    register_chunk_formats(registry);
    #[cfg(feature = "ogg")]
    register_ogg_format(registry);
    #[cfg(feature = "isobmff")]
    register_isobmff_format(registry);
}

#[cfg(feature = "isobmff")]
fn register_isobmff_format(registry: &Registry) {
    use crate::registry::SignatureTerm;
    registry.register_demuxer("isobmff", iso::IsoBmffDemuxer::boxed, "ISO BMFF", &["mp4", "m4a", "m4b", "m4v"]);
    registry.register_signature(FormatSignature {
        format_id: "isobmff".to_string(),
        terms: vec![SignatureTerm {
            offset: 4,
            bytes: b"ftyp".to_vec(),
        }],
    });
}

#[cfg(feature = "ogg")]
fn register_ogg_format(registry: &Registry) {
    use crate::registry::SignatureTerm;
    registry.register_demuxer("ogg", ogg::OggDemuxer::boxed, "Ogg", &["ogg", "oga", "opus"]);
    registry.register_signature(FormatSignature {
        format_id: "ogg".to_string(),
        terms: vec![SignatureTerm {
            offset: 0,
            bytes: b"OggS".to_vec(),
        }],
    });
}

#[cfg(any(feature = "wav", feature = "aiff"))]
fn register_chunk_formats(registry: &Registry) {
    #[cfg(feature = "wav")]
    {
        registry.register_demuxer("wav", chunk::ChunkDemuxer::boxed, "WAVE", &["wav", "wave"]);
        registry.register_signature(riff_form_signature("wav", *b"WAVE"));
    }
    #[cfg(feature = "aiff")]
    {
        registry.register_demuxer("aiff", chunk::ChunkDemuxer::boxed, "AIFF", &["aif", "aiff", "aifc"]);
        registry.register_signature(form_form_signature("aiff", *b"AIFF"));
        registry.register_signature(form_form_signature("aiff", *b"AIFC"));
    }
}

#[cfg(feature = "wav")]
fn riff_form_signature(format_id: &str, form_type: [u8; 4]) -> FormatSignature {
    use crate::registry::SignatureTerm;
    FormatSignature {
        format_id: format_id.to_string(),
        terms: vec![
            SignatureTerm {
                offset: 0,
                bytes: b"RIFF".to_vec(),
            },
            SignatureTerm {
                offset: 8,
                bytes: form_type.to_vec(),
            },
        ],
    }
}

#[cfg(feature = "aiff")]
fn form_form_signature(format_id: &str, form_type: [u8; 4]) -> FormatSignature {
    use crate::registry::SignatureTerm;
    FormatSignature {
        format_id: format_id.to_string(),
        terms: vec![
            SignatureTerm {
                offset: 0,
                bytes: b"FORM".to_vec(),
            },
            SignatureTerm {
                offset: 8,
                bytes: form_type.to_vec(),
            },
        ],
    }
}
