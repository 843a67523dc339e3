//! Opus packet TOC arithmetic.
//!
//! The first byte of every Opus packet (the TOC) encodes the coding mode
//! and frame duration; the low two bits encode how many frames follow.
//! See RFC 6716 §3.1.

use std::time::Duration;

use crate::error::MediaError;

/// Frame sizes in samples at 48 kHz, indexed by `toc >> 3`.
const FRAME_SAMPLES: [u64; 32] = [
    480, 960, 1920, 2880, // SILK-only NB
    480, 960, 1920, 2880, // SILK-only MB
    480, 960, 1920, 2880, // SILK-only WB
    480, 960, // Hybrid SWB
    480, 960, // Hybrid FB
    120, 240, 480, 960, // CELT-only NB
    120, 240, 480, 960, // CELT-only WB
    120, 240, 480, 960, // CELT-only SWB
    120, 240, 480, 960, // CELT-only FB
];

/// A packet may not carry more than 120 ms of audio.
const MAX_PACKET_SAMPLES: u64 = 5760;

/// Canonical SILK silence payload, played when the outbound queue is empty.
pub const OPUS_SILENCE_FRAME: [u8; 80] = {
    let mut frame = [0u8; 80];
    frame[0] = 0xf8;
    frame[1] = 0xff;
    frame[2] = 0xfe;
    frame
};

/// Nominal frame interval of the outbound track.
pub const OPUS_FRAME_DURATION: Duration = Duration::from_millis(20);

/// Returns the number of 48 kHz samples a packet spans.
///
/// Fails with [`MediaError::InvalidPacket`] when the input is too short
/// for its own framing or the total exceeds 120 ms.
pub fn packet_samples(data: &[u8]) -> Result<u64, MediaError> {
    let toc = *data.first().ok_or(MediaError::InvalidPacket)?;

    let frames: u64 = match toc & 3 {
        0 => 1,
        1 | 2 => 2,
        _ => {
            let count = *data.get(1).ok_or(MediaError::InvalidPacket)?;
            u64::from(count & 0x3f)
        }
    };

    let samples = frames * FRAME_SAMPLES[(toc >> 3) as usize];
    if samples > MAX_PACKET_SAMPLES {
        return Err(MediaError::InvalidPacket);
    }
    Ok(samples)
}

/// Returns the wall-clock duration a packet spans.
pub fn packet_duration(data: &[u8]) -> Result<Duration, MediaError> {
    let samples = packet_samples(data)?;
    Ok(Duration::from_micros(samples * 1_000_000 / 48_000))
}
