use livegpt_llm::CompletionError;
use livegpt_voice::VoiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("room error: {0}")]
    Room(String),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("packet encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
