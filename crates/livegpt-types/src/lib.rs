//! Shared domain types for the LiveGPT meeting assistant.
//!
//! Everything that crosses a crate boundary lives here: the supported
//! language table, meeting history events, participant metadata, the
//! wake-word tables, and the JSON packets published over the room's
//! reliable data channel.

pub mod events;
pub mod language;
pub mod packet;
pub mod wake;

pub use events::{MeetingEvent, PresenceEvent, PresenceKind, SpeechEvent};
pub use language::{Language, DEFAULT_LANGUAGE, LANGUAGES};
pub use packet::{
    AgentState, ErrorPacket, ParticipantMetadata, SignalPacket, StatePacket, TranscriptPacket,
};

/// Identity (and display name) the bot joins rooms with. Participants
/// carrying this identity are never subscribed to or answered.
pub const BOT_IDENTITY: &str = "KITT";
