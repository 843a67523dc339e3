//! The SFU seam.
//!
//! The conferencing SDK is an external collaborator; the agent only
//! depends on the small surface below. Events carry participant and
//! track descriptors rather than SDK handles, so the agent never holds a
//! back-pointer into room internals. [`local`] provides the in-process
//! implementation used by tests and the dev loop.

pub mod local;

use std::sync::Arc;

use livegpt_media::{RtpPacket, TrackCodec};
use livegpt_voice::OutboundTrack;
use tokio::sync::mpsc;

use crate::error::AgentError;

/// A remote participant as the room reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub sid: String,
    pub identity: String,
    pub name: String,
    /// Raw metadata string; may carry a JSON language preference.
    pub metadata: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenShare,
    Unknown,
}

/// Descriptor of a published track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub sid: String,
    pub source: TrackSource,
    pub codec: TrackCodec,
}

/// Room lifecycle events delivered to the agent, in observation order
/// per source.
pub enum RoomEvent {
    TrackPublished {
        track: TrackInfo,
        participant: ParticipantInfo,
    },
    TrackSubscribed {
        track: Arc<dyn RemoteTrack>,
        participant: ParticipantInfo,
    },
    TrackUnsubscribed {
        track_sid: String,
        participant: ParticipantInfo,
    },
    ParticipantConnected(ParticipantInfo),
    ParticipantDisconnected(ParticipantInfo),
    /// A reliable data-channel payload from another participant.
    DataReceived {
        payload: Vec<u8>,
        participant: ParticipantInfo,
    },
    Disconnected,
}

/// A subscribed remote audio track.
#[async_trait::async_trait]
pub trait RemoteTrack: Send + Sync {
    fn info(&self) -> TrackInfo;

    /// Next depacketized RTP packet; `None` once the track ends.
    async fn read_rtp(&self) -> Option<RtpPacket>;
}

/// Handle onto a joined room.
#[async_trait::async_trait]
pub trait RoomHandle: Send + Sync {
    fn name(&self) -> String;

    fn local_identity(&self) -> String;

    /// Remote participants currently in the room (the local participant
    /// is not included).
    fn remote_participants(&self) -> Vec<ParticipantInfo>;

    async fn set_subscribed(&self, track_sid: &str, subscribed: bool) -> Result<(), AgentError>;

    /// Publishes the agent's audio track; the SFU drives it by pulling
    /// samples at the media tick.
    async fn publish_track(&self, track: Arc<OutboundTrack>) -> Result<(), AgentError>;

    /// Publishes a payload on the reliable data channel.
    async fn publish_data(&self, payload: Vec<u8>) -> Result<(), AgentError>;

    async fn disconnect(&self);
}

/// Everything needed to join one room.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// SFU websocket URL.
    pub url: String,
    /// Join token minted by the supervisor.
    pub token: String,
    /// Room name the token grants access to.
    pub room: String,
    /// Identity to join under.
    pub identity: String,
    /// Display name.
    pub name: String,
    /// Whether the SFU should subscribe to remote tracks automatically.
    /// The agent always joins with this off and subscribes to
    /// microphones explicitly.
    pub auto_subscribe: bool,
}

/// Connects agents to rooms. Process-scoped.
#[async_trait::async_trait]
pub trait RoomConnector: Send + Sync {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<(Arc<dyn RoomHandle>, mpsc::UnboundedReceiver<RoomEvent>), AgentError>;
}
