//! OpenAI-compatible streaming chat-completion client.
//!
//! Works against any endpoint that speaks the OpenAI chat-completion
//! format with `stream: true` (OpenAI itself, proxies, local gateways):
//! the response is an SSE stream of `data:` lines, each carrying a JSON
//! chunk with token deltas, terminated by `data: [DONE]`.

use std::pin::Pin;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::CompletionError;
use crate::types::ChatMessage;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Raw token deltas in model emission order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// Provider seam for streaming completions. Process-scoped and shared by
/// reference across agents.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<DeltaStream, CompletionError>;
}

/// Client for OpenAI-compatible chat-completion endpoints.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Points the client at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait::async_trait]
impl ChatBackend for OpenAiClient {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<DeltaStream, CompletionError> {
        if self.api_key.is_empty() {
            return Err(CompletionError::NotConfigured(
                "missing OpenAI API key".to_string(),
            ));
        }

        debug!(model = %self.model, messages = messages.len(), "opening completion stream");

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "stream": true,
            }))
            .send()
            .await
            .map_err(|e| CompletionError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => CompletionError::RateLimited,
                401 | 403 => CompletionError::AuthFailed(body),
                _ => CompletionError::RequestFailed(format!("HTTP {status}: {body}")),
            });
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut buffer: Vec<u8> = Vec::new();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| CompletionError::RequestFailed(e.to_string()))?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    let line = String::from_utf8_lossy(&line);
                    let Some(payload) = parse_sse_data(line.trim_end()) else {
                        continue;
                    };
                    if payload == "[DONE]" {
                        break 'read;
                    }

                    let parsed: StreamChunk = serde_json::from_str(payload)
                        .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                yield content;
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Extracts the payload of an SSE `data:` line; other SSE fields and
/// keep-alive comments are skipped.
fn parse_sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_data_lines_parsed() {
        assert_eq!(parse_sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(parse_sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(parse_sse_data(": keep-alive"), None);
        assert_eq!(parse_sse_data("event: ping"), None);
        assert_eq!(parse_sse_data(""), None);
    }

    #[test]
    fn completions_url_strips_trailing_slash() {
        let client = OpenAiClient::new("sk-x").with_base_url("https://example.com/v1/");
        assert_eq!(
            client.completions_url(),
            "https://example.com/v1/chat/completions"
        );
    }

    #[test]
    fn chunk_deserialization_tolerates_missing_fields() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());

        let chunk: StreamChunk = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(chunk.choices.is_empty());
    }

    #[tokio::test]
    async fn missing_api_key_rejected_without_network() {
        let client = OpenAiClient::new("");
        let result = client.stream_chat(vec![]).await;
        let err = match result {
            Ok(_) => panic!("expected stream_chat to fail"),
            Err(err) => err,
        };
        assert!(matches!(err, CompletionError::NotConfigured(_)));
    }
}
