//! Error types shared across Recast crates.

use serde::{Deserialize, Serialize};

/// Coarse classification of capture failures.
///
/// This is the taxonomy surfaced to consumers of the engine (a failed
/// session carries exactly one of these). [`RecastError`] variants map
/// onto it via [`RecastError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The user or the platform refused access to a capture device.
    PermissionDenied,
    /// No display or audio device is available to capture.
    NoSourceAvailable,
    /// The user dismissed a permission or share-target prompt.
    UserCancelled,
    /// Capture or encoding is not supported in this environment.
    Unsupported,
    /// Capture requires a trusted transport context.
    InsecureContext,
    /// The audio mixing graph could not be built (recoverable).
    MixingFailed,
    /// The encoder raised a fatal error mid-stream.
    EncodingFailed,
    /// The session reached shutdown without producing any data.
    EmptyRecording,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::NoSourceAvailable => "no-source-available",
            ErrorKind::UserCancelled => "user-cancelled",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::InsecureContext => "insecure-context",
            ErrorKind::MixingFailed => "mixing-failed",
            ErrorKind::EncodingFailed => "encoding-failed",
            ErrorKind::EmptyRecording => "empty-recording",
        };
        f.write_str(name)
    }
}

/// Top-level error type for Recast operations.
#[derive(Debug, thiserror::Error)]
pub enum RecastError {
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("No capture source available: {message}")]
    NoSource { message: String },

    #[error("Cancelled by user: {message}")]
    Cancelled { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Insecure context: {message}")]
    InsecureContext { message: String },

    #[error("Audio mixing error: {message}")]
    Mixing { message: String },

    #[error("No audio sources to mix")]
    NoAudioToMix,

    #[error("Encoding error: {message}")]
    Encoding { message: String },

    #[error("Recording produced no data")]
    EmptyRecording,

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using RecastError.
pub type RecastResult<T> = Result<T, RecastError>;

impl RecastError {
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    pub fn no_source(msg: impl Into<String>) -> Self {
        Self::NoSource {
            message: msg.into(),
        }
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn insecure_context(msg: impl Into<String>) -> Self {
        Self::InsecureContext {
            message: msg.into(),
        }
    }

    pub fn mixing(msg: impl Into<String>) -> Self {
        Self::Mixing {
            message: msg.into(),
        }
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding {
            message: msg.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Map this error onto the capture failure taxonomy, when it has a
    /// direct counterpart. Transport-level errors (`Io`, `Json`,
    /// `Other`, `Session`, `Config`) return `None`; the session picks a
    /// phase-appropriate default for those.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::PermissionDenied { .. } => Some(ErrorKind::PermissionDenied),
            Self::NoSource { .. } => Some(ErrorKind::NoSourceAvailable),
            Self::Cancelled { .. } => Some(ErrorKind::UserCancelled),
            Self::Unsupported { .. } => Some(ErrorKind::Unsupported),
            Self::InsecureContext { .. } => Some(ErrorKind::InsecureContext),
            Self::Mixing { .. } | Self::NoAudioToMix => Some(ErrorKind::MixingFailed),
            Self::Encoding { .. } => Some(ErrorKind::EncodingFailed),
            Self::EmptyRecording => Some(ErrorKind::EmptyRecording),
            _ => None,
        }
    }
}
