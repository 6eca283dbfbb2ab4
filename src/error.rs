//! Centralized error types for echomail.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the echomail library.
#[derive(Error, Debug)]
pub enum EchomailError {
    /// The wire container or header block is structurally malformed.
    #[error("Format error: {0}")]
    Format(String),

    /// The envelope is well-formed but semantically invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A verification failure raised while decoding an envelope.
    #[error("Decoding error: {0}")]
    Decode(#[source] Box<EchomailError>),

    /// I/O error with the associated file path.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Saving an attachment would overwrite an existing file.
    #[error("Attempt to overwrite attachment: {0}")]
    AttachmentExists(PathBuf),

    /// The envelope claims a sender other than the transport origin.
    #[error("Sender spoof detected: message claims '{claimed}', transport origin is '{origin}'")]
    SenderMismatch { claimed: String, origin: String },

    /// Origin verification was requested but no origin was supplied.
    #[error("Transport origin is not available: {0}")]
    MissingOrigin(String),

    /// An invalid path was provided.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Convenience alias for `Result<T, EchomailError>`.
pub type Result<T> = std::result::Result<T, EchomailError>;

impl EchomailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(reason: impl Into<String>) -> Self {
        Self::Format(reason.into())
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// `true` for structural malformation, including inside a `Decode` wrapper.
    pub fn is_format(&self) -> bool {
        match self {
            Self::Format(_) => true,
            Self::Decode(inner) => inner.is_format(),
            _ => false,
        }
    }

    /// `true` for semantic violations, including inside a `Decode` wrapper.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Decode(inner) => inner.is_validation(),
            _ => false,
        }
    }
}
