//! Per-room meeting participant for LiveGPT.
//!
//! An [`Agent`] joins one conference room as a virtual participant:
//! every subscribed microphone feeds a transcriber, final transcripts run
//! through the activation policy, and accepted prompts become answer
//! turns — a streamed model response synthesized sentence by sentence and
//! played back in order on the published audio track, with transcripts
//! and lifecycle state mirrored to clients over the data channel.
//!
//! The conferencing SFU is an external collaborator reached through the
//! [`room`] seam; [`room::local`] is the in-process implementation that
//! exercises it in tests and the dev loop.

pub mod activation;
pub mod agent;
pub mod completion;
pub mod error;
pub mod room;

pub use activation::{detect_wake, ActivationIntent, ActivationState};
pub use agent::{Agent, AgentOptions, Providers};
pub use completion::{split_language_prefix, ChatCompleter};
pub use error::AgentError;
pub use room::{
    ConnectRequest, ParticipantInfo, RemoteTrack, RoomConnector, RoomEvent, RoomHandle, TrackInfo,
    TrackSource,
};
