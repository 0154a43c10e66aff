use thiserror::Error;

/// Errors surfaced by the sanitization pipeline.
///
/// Detector-level faults (NER model unavailable, a panicking backend) are
/// deliberately absent: those degrade to empty detection lists so the
/// pipeline keeps running rather than tempting callers to bypass
/// sanitization. Structural faults fail before any output is emitted.
#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("input exceeds maximum length of {limit} characters (got {actual})")]
    InputTooLarge { limit: usize, actual: usize },

    #[error("invalid {format} input: {reason}")]
    InvalidFormat { format: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed rehydration map: {0}")]
    MalformedMap(String),
}

impl SanitizeError {
    pub(crate) fn invalid_format(format: &'static str, reason: impl Into<String>) -> Self {
        SanitizeError::InvalidFormat {
            format,
            reason: reason.into(),
        }
    }
}
