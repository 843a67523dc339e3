//! Minimal RTP surface the transcription pipeline depends on.
//!
//! The room seam hands depacketized RTP to the agent; only the fields the
//! OGG serializer needs are carried. One RTP packet carries exactly one
//! Opus packet (RFC 7587 §4.2).

use bytes::Bytes;

/// One depacketized RTP packet from a subscribed audio track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub sequence: u16,
    pub timestamp: u32,
    pub payload: Bytes,
}

/// Negotiated codec parameters of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCodec {
    /// MIME type, e.g. `audio/opus`.
    pub mime_type: String,
    /// RTP clock rate in Hz.
    pub clock_rate: u32,
    /// Channel count.
    pub channels: u8,
}

impl TrackCodec {
    /// The only codec the pipeline accepts.
    pub fn opus() -> Self {
        Self {
            mime_type: "audio/opus".to_string(),
            clock_rate: 48_000,
            channels: 1,
        }
    }

    /// Case-insensitive Opus check, per the MIME registration.
    pub fn is_opus(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("audio/opus")
    }
}
