//! OGG/Opus framing for the LiveGPT meeting assistant.
//!
//! The speech providers speak OGG-Opus in both directions: inbound RTP is
//! serialized into an OGG bit-stream for the recognizer, and synthesized
//! answers arrive as OGG-Opus blobs that are re-packetized for the
//! outbound room track. This crate owns that framing: a packetizer that
//! extracts whole Opus packets from an OGG stream, a writer that produces
//! one, and the Opus TOC arithmetic both sides need.

mod crc;
pub mod error;
pub mod ogg;
pub mod ogg_writer;
pub mod opus;
pub mod rtp;

pub use error::MediaError;
pub use ogg::{OggIdHeader, OggPacketizer};
pub use ogg_writer::OggWriter;
pub use opus::{packet_duration, packet_samples, OPUS_FRAME_DURATION, OPUS_SILENCE_FRAME};
pub use rtp::{RtpPacket, TrackCodec};
