//! Errors raised while negotiating schemas and decoding records.

use thiserror::Error;

/// Errors that can occur while decoding a wire record.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("meta for {kind} is missing field {field:?}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("no field order for {0}, meta must precede data")]
    NoFieldOrder(&'static str),
    #[error("insufficient fields for {kind}: expected at least {expected}, got {actual}")]
    InsufficientFields {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl CodecError {
    /// Whether the stream must be abandoned.
    ///
    /// Schema violations mean the collector and analyzer disagree on the
    /// protocol. A malformed line is only a partially written record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CodecError::MissingField { .. }
                | CodecError::NoFieldOrder(_)
                | CodecError::InsufficientFields { .. }
        )
    }
}
