//! The finished recording artifact.

use chrono::{DateTime, Utc};

/// The assembled recording: every encoder chunk concatenated in
/// emission order, tagged with the negotiated container identifier.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Concatenated encoded payload.
    pub data: Vec<u8>,

    /// Negotiated container/codec mime identifier.
    pub mime_type: String,

    /// Whether system audio was actually captured. May differ from what
    /// was requested if the source refused it.
    pub had_system_audio: bool,

    /// Wall-clock completion time.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Assemble from the ordered chunk sequence. Callers guarantee the
    /// sequence is non-empty; an empty recording never becomes an
    /// artifact.
    pub fn assemble(
        chunks: &[Vec<u8>],
        mime_type: impl Into<String>,
        had_system_audio: bool,
    ) -> Self {
        let mut data = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
        for chunk in chunks {
            data.extend_from_slice(chunk);
        }
        Self {
            data,
            mime_type: mime_type.into(),
            had_system_audio,
            created_at: Utc::now(),
        }
    }

    /// Deterministic download name:
    /// `screen-recording-<TAG>-<ISO8601-no-colons>.<ext>`.
    pub fn suggested_file_name(&self) -> String {
        let tag = codec_tag(&self.mime_type);
        let extension = file_extension(&self.mime_type);
        let timestamp = self.created_at.format("%Y-%m-%dT%H-%M-%S");
        format!("screen-recording-{tag}-{timestamp}.{extension}")
    }
}

/// Extension by simple substring match on the codec identifier, with
/// `.mp4` as the default.
pub fn file_extension(mime_type: &str) -> &'static str {
    if mime_type.contains("mp4") {
        "mp4"
    } else if mime_type.contains("webm") {
        "webm"
    } else {
        "mp4"
    }
}

/// Human-facing codec tag for file names.
pub fn codec_tag(mime_type: &str) -> &'static str {
    if mime_type.contains("mp4") {
        "MP4"
    } else {
        "WebM"
    }
}
