//! Streaming speech-recognition contract.
//!
//! The transcription pipeline is written against [`SttClient`]; the
//! Google Cloud implementation lives in [`google`]. A session is a pair
//! of channels: OGG audio bytes flow in, recognition updates flow out.
//! Closing the audio sender half-closes the session and the provider
//! finishes the stream.

pub mod google;

use bytes::Bytes;
use livegpt_types::{wake, Language};
use tokio::sync::mpsc;

use crate::error::VoiceError;

/// Boost applied to the wake-phrase adaptation set.
const WAKE_PHRASE_BOOST: f32 = 10.0;

/// One recognition update handed to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizeResult {
    pub text: String,
    pub is_final: bool,
}

/// First-alternative view of one provider result.
#[derive(Debug, Clone, PartialEq)]
pub struct SttResult {
    /// Transcript alternatives, most likely first.
    pub alternatives: Vec<String>,
    pub is_final: bool,
}

/// One provider response; may carry several results.
///
/// `error` is a provider-reported recognition error embedded in an
/// otherwise healthy stream; transport failures surface as `Err` items
/// on the session channel instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SttResponse {
    pub error: Option<String>,
    pub results: Vec<SttResult>,
}

/// Configuration of one streaming recognition session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub channels: u8,
    /// Provider-side language code (see [`Language::stt_code`]).
    pub language_code: String,
    pub model: String,
    pub use_enhanced: bool,
    pub interim_results: bool,
    /// Phrases boosted by speech adaptation so short activations survive
    /// recognition.
    pub boost_phrases: Vec<String>,
    pub boost: f32,
}

impl SessionConfig {
    /// Session configuration for one microphone track: enhanced
    /// command-style model, interim results, wake-phrase boosting.
    pub fn for_track(sample_rate: u32, channels: u8, language: &Language) -> Self {
        Self {
            sample_rate,
            channels,
            language_code: language.stt_code.to_string(),
            model: "command_and_search".to_string(),
            use_enhanced: true,
            interim_results: true,
            boost_phrases: wake::wake_phrases(),
            boost: WAKE_PHRASE_BOOST,
        }
    }
}

/// An open streaming session.
///
/// Dropping `audio_tx` signals end of audio; `results` closes once the
/// provider finishes the stream or fails.
pub struct SttSession {
    pub audio_tx: mpsc::Sender<Bytes>,
    pub results: mpsc::Receiver<Result<SttResponse, VoiceError>>,
}

/// Opens streaming recognition sessions. Process-scoped and shared by
/// reference across agents.
#[async_trait::async_trait]
pub trait SttClient: Send + Sync {
    async fn open(&self, config: SessionConfig) -> Result<SttSession, VoiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use livegpt_types::DEFAULT_LANGUAGE;

    #[test]
    fn track_config_boosts_wake_phrases() {
        let config = SessionConfig::for_track(48_000, 1, DEFAULT_LANGUAGE);
        assert!(config.use_enhanced);
        assert!(config.interim_results);
        assert!(config.boost > 0.0);
        assert!(config
            .boost_phrases
            .iter()
            .any(|p| p == "hey kitt"));
    }

    #[test]
    fn track_config_uses_stt_code() {
        let mandarin = livegpt_types::Language::find("cmn-CN").unwrap();
        let config = SessionConfig::for_track(48_000, 1, mandarin);
        assert_eq!(config.language_code, "zh");
    }
}
