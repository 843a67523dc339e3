//! Packets published over the room's reliable data channel.
//!
//! The browser clients consume a small JSON envelope:
//!
//! ```json
//! { "type": <0|1|2>, "data": { ... } }
//! ```
//!
//! `0` carries a transcript update, `1` an agent state change, `2` a
//! user-visible error message. The numeric tags are part of the client
//! contract and must not change.

use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle state mirrored to clients so the UI can animate the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Nothing in flight, nobody activated.
    Idle,
    /// An answer turn started; the model response is pending.
    Loading,
    /// Synthesized audio is queued or playing.
    Speaking,
    /// A participant is activated; their next utterance will be answered.
    Active,
}

impl AgentState {
    fn as_u8(self) -> u8 {
        match self {
            AgentState::Idle => 0,
            AgentState::Loading => 1,
            AgentState::Speaking => 2,
            AgentState::Active => 3,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(AgentState::Idle),
            1 => Some(AgentState::Loading),
            2 => Some(AgentState::Speaking),
            3 => Some(AgentState::Active),
            _ => None,
        }
    }
}

impl Serialize for AgentState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for AgentState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = u8::deserialize(deserializer)?;
        AgentState::from_u8(v).ok_or_else(|| D::Error::custom(format!("unknown agent state {v}")))
    }
}

/// Transcript update for one participant, interim or final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPacket {
    pub sid: String,
    pub name: String,
    pub text: String,
    pub is_final: bool,
}

/// Agent lifecycle state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePacket {
    pub state: AgentState,
}

/// User-visible diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPacket {
    pub message: String,
}

/// The envelope published on the data channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalPacket {
    Transcript(TranscriptPacket),
    State(StatePacket),
    Error(ErrorPacket),
}

impl SignalPacket {
    pub fn state(state: AgentState) -> Self {
        SignalPacket::State(StatePacket { state })
    }

    pub fn error(message: impl Into<String>) -> Self {
        SignalPacket::Error(ErrorPacket {
            message: message.into(),
        })
    }

    /// Numeric packet tag as seen on the wire.
    pub fn kind(&self) -> u8 {
        match self {
            SignalPacket::Transcript(_) => 0,
            SignalPacket::State(_) => 1,
            SignalPacket::Error(_) => 2,
        }
    }
}

impl Serialize for SignalPacket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("SignalPacket", 2)?;
        st.serialize_field("type", &self.kind())?;
        match self {
            SignalPacket::Transcript(data) => st.serialize_field("data", data)?,
            SignalPacket::State(data) => st.serialize_field("data", data)?,
            SignalPacket::Error(data) => st.serialize_field("data", data)?,
        }
        st.end()
    }
}

impl<'de> Deserialize<'de> for SignalPacket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(rename = "type")]
            kind: u8,
            data: serde_json::Value,
        }

        let raw = Raw::deserialize(deserializer)?;
        let packet = match raw.kind {
            0 => SignalPacket::Transcript(
                serde_json::from_value(raw.data).map_err(D::Error::custom)?,
            ),
            1 => SignalPacket::State(serde_json::from_value(raw.data).map_err(D::Error::custom)?),
            2 => SignalPacket::Error(serde_json::from_value(raw.data).map_err(D::Error::custom)?),
            other => return Err(D::Error::custom(format!("unknown packet type {other}"))),
        };
        Ok(packet)
    }
}

/// Optional JSON metadata attached to room participants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantMetadata {
    #[serde(rename = "languageCode", skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

impl ParticipantMetadata {
    /// Parses metadata from the raw participant metadata string.
    ///
    /// An empty or malformed string yields the default (no language
    /// preference); metadata problems must never break a join.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_wire_format() {
        let packet = SignalPacket::Transcript(TranscriptPacket {
            sid: "PA_x".into(),
            name: "alice".into(),
            text: "hello".into(),
            is_final: true,
        });
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": 0,
                "data": { "sid": "PA_x", "name": "alice", "text": "hello", "isFinal": true }
            })
        );
    }

    #[test]
    fn state_wire_format() {
        let packet = SignalPacket::state(AgentState::Loading);
        let json = serde_json::to_string(&packet).unwrap();
        assert_eq!(json, r#"{"type":1,"data":{"state":1}}"#);
    }

    #[test]
    fn error_wire_format() {
        let packet = SignalPacket::error("boom");
        let json = serde_json::to_string(&packet).unwrap();
        assert_eq!(json, r#"{"type":2,"data":{"message":"boom"}}"#);
    }

    #[test]
    fn packets_round_trip() {
        let packets = [
            SignalPacket::Transcript(TranscriptPacket {
                sid: "s".into(),
                name: "n".into(),
                text: "t".into(),
                is_final: false,
            }),
            SignalPacket::state(AgentState::Active),
            SignalPacket::error("x"),
        ];
        for packet in packets {
            let json = serde_json::to_string(&packet).unwrap();
            let back: SignalPacket = serde_json::from_str(&json).unwrap();
            assert_eq!(packet, back);
        }
    }

    #[test]
    fn unknown_packet_type_rejected() {
        let err = serde_json::from_str::<SignalPacket>(r#"{"type":9,"data":{}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn metadata_parses_language() {
        let meta = ParticipantMetadata::parse(r#"{"languageCode":"fr-FR"}"#);
        assert_eq!(meta.language_code.as_deref(), Some("fr-FR"));
    }

    #[test]
    fn metadata_tolerates_garbage() {
        assert_eq!(ParticipantMetadata::parse(""), ParticipantMetadata::default());
        assert_eq!(
            ParticipantMetadata::parse("not json"),
            ParticipantMetadata::default()
        );
    }
}
