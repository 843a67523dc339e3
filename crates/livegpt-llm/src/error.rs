use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited")]
    RateLimited,

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl CompletionError {
    /// Whether the error is part of an orderly shutdown.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CompletionError::Cancelled)
    }
}
