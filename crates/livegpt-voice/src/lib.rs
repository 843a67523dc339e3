//! Speech pipeline for the LiveGPT meeting assistant.
//!
//! Owns both directions of the audio path: inbound RTP is serialized and
//! fed through rolling streaming-recognition sessions ([`Transcriber`]),
//! and synthesized answers are queued for playback on the published room
//! track ([`OutboundTrack`]). Provider access goes through the
//! [`SttClient`] and [`Synthesizer`] seams; the Google Cloud
//! implementations live in [`stt::google`] and [`tts`].

pub mod auth;
pub mod error;
pub mod stt;
pub mod track;
pub mod transcriber;
pub mod tts;

pub use auth::{ServiceAccountKey, TokenProvider};
pub use error::VoiceError;
pub use stt::{
    RecognizeResult, SessionConfig, SttClient, SttResponse, SttResult, SttSession,
};
pub use track::{MediaSample, OutboundTrack};
pub use transcriber::Transcriber;
pub use tts::{GoogleSynthesizer, Synthesizer};
