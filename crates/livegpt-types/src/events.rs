//! Meeting history events.
//!
//! The agent keeps an append-only list of these per room; it is the
//! source of truth for the conversation context sent to the language
//! model. Events are never mutated after being appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a meeting's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingEvent {
    /// Somebody (human or bot) finished a speech turn.
    Speech(SpeechEvent),
    /// Somebody joined or left the room.
    Presence(PresenceEvent),
}

/// A completed speech turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechEvent {
    pub participant_name: String,
    pub is_bot: bool,
    pub text: String,
}

/// A join/leave marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub participant_name: String,
    pub kind: PresenceKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    Joined,
    Left,
}

impl MeetingEvent {
    /// Convenience constructor for a human speech turn.
    pub fn user_speech(name: impl Into<String>, text: impl Into<String>) -> Self {
        MeetingEvent::Speech(SpeechEvent {
            participant_name: name.into(),
            is_bot: false,
            text: text.into(),
        })
    }

    /// Convenience constructor for a bot speech turn.
    pub fn bot_speech(name: impl Into<String>, text: impl Into<String>) -> Self {
        MeetingEvent::Speech(SpeechEvent {
            participant_name: name.into(),
            is_bot: true,
            text: text.into(),
        })
    }

    pub fn presence(name: impl Into<String>, kind: PresenceKind, at: DateTime<Utc>) -> Self {
        MeetingEvent::Presence(PresenceEvent {
            participant_name: name.into(),
            kind,
            at,
        })
    }
}
