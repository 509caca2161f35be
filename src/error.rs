use thiserror::Error;

/// Failure of a translation backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to send translation request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Translation API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode translation response: {0}")]
    Decode(String),

    #[error("Empty translation for: {0}")]
    EmptyTranslation(String),

    #[error("Translation response contained no choices")]
    EmptyResponse,

    #[error("Translation response is not a JSON array")]
    NoArray,

    #[error("Translation response size mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}

impl BackendError {
    /// Transport failures, rate limiting (429) and server errors (5xx) may
    /// succeed on a later attempt. Everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
