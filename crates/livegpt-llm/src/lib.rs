//! Streaming chat completions for the LiveGPT meeting assistant.
//!
//! [`ChatBackend`] is the provider seam: it turns a message list into a
//! stream of raw token deltas. [`OpenAiClient`] implements it against any
//! OpenAI-compatible `/chat/completions` endpoint. [`SentenceStream`]
//! re-chunks the deltas at sentence boundaries so synthesis can start
//! before the model finishes talking.

pub mod client;
pub mod error;
pub mod sentence;
pub mod types;

pub use client::{ChatBackend, DeltaStream, OpenAiClient, DEFAULT_MODEL};
pub use error::CompletionError;
pub use sentence::{PeriodSplitter, SentenceSplitter, SentenceStream};
pub use types::{ChatMessage, Role};
