//! Speech synthesis contract and the Google Cloud TTS client.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use bytes::Bytes;
use livegpt_types::Language;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::auth::TokenProvider;
use crate::error::VoiceError;

/// Synthesis requests beyond this length are rejected up front; the
/// provider caps input at 5000 characters.
const MAX_INPUT_CHARS: usize = 5000;

/// Timeout for one synthesis round-trip.
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

const ENDPOINT: &str = "https://texttospeech.googleapis.com";

/// Turns a text fragment into OGG-Opus audio. Stateless; concurrent
/// calls are expected during answer turns.
#[async_trait::async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: &Language) -> Result<Bytes, VoiceError>;
}

/// Google Cloud Text-to-Speech over REST.
pub struct GoogleSynthesizer {
    http: reqwest::Client,
    auth: Arc<TokenProvider>,
    endpoint: String,
}

impl GoogleSynthesizer {
    pub fn new(auth: Arc<TokenProvider>) -> Self {
        Self::with_endpoint(auth, ENDPOINT)
    }

    /// Endpoint override, used by tests.
    pub fn with_endpoint(auth: Arc<TokenProvider>, endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth,
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

#[async_trait::async_trait]
impl Synthesizer for GoogleSynthesizer {
    async fn synthesize(&self, text: &str, language: &Language) -> Result<Bytes, VoiceError> {
        if text.chars().count() > MAX_INPUT_CHARS {
            return Err(VoiceError::Tts(format!(
                "input exceeds {MAX_INPUT_CHARS} characters"
            )));
        }

        let bearer = self.auth.bearer().await?;
        let body = json!({
            "input": { "text": text },
            "voice": {
                "languageCode": language.code,
                "name": language.tts_voice,
            },
            "audioConfig": {
                "audioEncoding": "OGG_OPUS",
                "sampleRateHertz": 48_000,
            },
        });

        debug!(voice = language.tts_voice, chars = text.len(), "synthesizing");

        let response = self
            .http
            .post(format!("{}/v1/text:synthesize", self.endpoint))
            .header("Authorization", bearer)
            .json(&body)
            .timeout(SYNTHESIS_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Tts(format!("synthesis request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!(
                "synthesis returned {status}: {detail}"
            )));
        }

        let payload: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Tts(format!("invalid synthesis response: {e}")))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(payload.audio_content)
            .map_err(|e| VoiceError::Tts(format!("invalid audio encoding: {e}")))?;

        Ok(Bytes::from(audio))
    }
}
