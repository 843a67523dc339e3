use livegpt_media::MediaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("this codec isn't supported")]
    UnsupportedCodec,

    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("speech session deadline exceeded")]
    DeadlineExceeded,

    #[error("operation cancelled")]
    Cancelled,

    #[error("speech recognizer error: {0}")]
    Stt(String),

    #[error("speech synthesizer error: {0}")]
    Tts(String),

    #[error("credentials error: {0}")]
    Auth(String),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl VoiceError {
    /// Whether the error is part of an orderly shutdown rather than a
    /// failure worth surfacing to users.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, VoiceError::Cancelled)
    }
}
