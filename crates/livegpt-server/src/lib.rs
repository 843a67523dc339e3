//! Lobby server for the LiveGPT meeting assistant.
//!
//! Accepts SFU webhooks and direct join requests, and supervises the
//! per-room agents: at most one agent per room, created on demand and
//! torn down when its room empties or the process shuts down.

pub mod api;
pub mod config;
pub mod directory;
pub mod supervisor;
pub mod webhook;

pub use api::{app, AppState};
pub use config::{Config, ConfigError};
pub use directory::{LiveKitDirectory, RoomInfo, RoomLookup};
pub use supervisor::{Supervisor, SupervisorError};
