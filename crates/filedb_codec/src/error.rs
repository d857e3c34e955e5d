//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("{format} encoding failed: {message}")]
    EncodingFailed {
        /// Name of the format that failed.
        format: &'static str,
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes.
    #[error("{format} decoding failed: {message}")]
    DecodingFailed {
        /// Name of the format that failed.
        format: &'static str,
        /// Description of the decoding error.
        message: String,
    },

    /// The format name is not one of the known formats.
    #[error("unknown format: {name}")]
    UnknownFormat {
        /// The unrecognised name.
        name: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(format: &'static str, message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            format,
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(format: &'static str, message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            format,
            message: message.into(),
        }
    }

    /// Create an unknown format error.
    pub fn unknown_format(name: impl Into<String>) -> Self {
        Self::UnknownFormat { name: name.into() }
    }
}
