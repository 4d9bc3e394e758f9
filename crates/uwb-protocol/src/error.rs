//! Error types for telemetry line decoding

use thiserror::Error;

/// Errors that can occur while decoding a telemetry line
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Line bytes are not valid UTF-8
    #[error("line is not valid UTF-8")]
    InvalidEncoding,

    /// Token count does not match the message layout
    #[error("{tag}: expected {expected} fields, got {actual}")]
    FieldCountMismatch {
        tag: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A token could not be decoded as its declared field type
    #[error("{tag}: field '{field}' has invalid {kind} token '{token}'")]
    InvalidToken {
        tag: &'static str,
        field: &'static str,
        kind: &'static str,
        token: String,
    },
}

impl DecodeError {
    /// True for the malformed-message class of failures (anything other
    /// than an encoding failure)
    pub fn is_malformed(&self) -> bool {
        !matches!(self, DecodeError::InvalidEncoding)
    }
}
