//! Outbound audio track: FIFO playback of synthesized OGG-Opus sources.
//!
//! The SFU drives the track by pulling one sample per 20 ms frame
//! interval. Samples come from the current source until it is exhausted,
//! then from the head of the queue; with nothing queued the track emits
//! the canonical Opus silence frame so the RTP stream never starves.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use livegpt_media::{packet_duration, OggPacketizer, OPUS_FRAME_DURATION, OPUS_SILENCE_FRAME};
use tracing::debug;

use crate::error::VoiceError;

type Source = OggPacketizer<Cursor<Bytes>>;
type CompleteCallback = Arc<dyn Fn() + Send + Sync>;

/// One Opus packet ready for the RTP writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSample {
    pub data: Bytes,
    pub duration: Duration,
}

struct Inner {
    current: Option<Source>,
    queue: VecDeque<Source>,
    on_complete: Option<CompleteCallback>,
    closed: bool,
}

/// The agent's published audio track.
///
/// Thread-safe; `enqueue` is called from synthesis tasks while the SFU's
/// sample puller calls `next_sample` concurrently.
pub struct OutboundTrack {
    inner: Mutex<Inner>,
}

impl Default for OutboundTrack {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundTrack {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: None,
                queue: VecDeque::new(),
                on_complete: None,
                closed: false,
            }),
        }
    }

    /// Queues one finite OGG-Opus byte stream for playback. Sources play
    /// strictly in enqueue order.
    ///
    /// The stream's ID header is validated here; multi-channel audio is
    /// rejected because the track is published as mono.
    pub fn enqueue(&self, ogg: Bytes) -> Result<(), VoiceError> {
        let source = OggPacketizer::new(Cursor::new(ogg))?;
        if source.id_header().channels != 1 {
            return Err(VoiceError::InvalidFormat(format!(
                "expected mono audio, got {} channels",
                source.id_header().channels
            )));
        }

        let mut inner = self.inner.lock().expect("track mutex poisoned");
        if inner.closed {
            return Err(VoiceError::Cancelled);
        }
        inner.queue.push_back(source);
        Ok(())
    }

    /// Registers the callback fired once per source when it is exhausted.
    pub fn on_complete(&self, callback: impl Fn() + Send + Sync + 'static) {
        let mut inner = self.inner.lock().expect("track mutex poisoned");
        inner.on_complete = Some(Arc::new(callback));
    }

    /// Number of sources not yet fully played (including the current one).
    pub fn pending_sources(&self) -> usize {
        let inner = self.inner.lock().expect("track mutex poisoned");
        inner.queue.len() + usize::from(inner.current.is_some())
    }

    /// Serves the next packet to the sample puller, or `None` once the
    /// track is closed.
    pub fn next_sample(&self) -> Option<MediaSample> {
        let mut completions = 0usize;
        let mut callback = None;

        let sample = {
            let mut inner = self.inner.lock().expect("track mutex poisoned");
            if inner.closed {
                return None;
            }
            callback.clone_from(&inner.on_complete);

            loop {
                if inner.current.is_none() {
                    inner.current = inner.queue.pop_front();
                }

                let Some(source) = inner.current.as_mut() else {
                    break silence_sample();
                };

                match source.read_packet() {
                    Ok(Some(data)) => {
                        let duration = match packet_duration(&data) {
                            Ok(d) if !d.is_zero() => d,
                            Ok(_) => OPUS_FRAME_DURATION,
                            Err(e) => {
                                debug!(error = %e, "undecodable packet duration, assuming one frame");
                                OPUS_FRAME_DURATION
                            }
                        };
                        break MediaSample { data, duration };
                    }
                    Ok(None) => {
                        completions += 1;
                        inner.current = None;
                    }
                    Err(e) => {
                        debug!(error = %e, "dropping corrupt playback source");
                        completions += 1;
                        inner.current = None;
                    }
                }
            }
        };

        // Completion callbacks run outside the queue lock; they re-enter
        // agent code.
        if let Some(callback) = callback {
            for _ in 0..completions {
                callback();
            }
        }

        Some(sample)
    }

    /// Drains the queue and stops emitting samples (silence included).
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("track mutex poisoned");
        inner.closed = true;
        inner.current = None;
        inner.queue.clear();
    }
}

fn silence_sample() -> MediaSample {
    MediaSample {
        data: Bytes::from_static(&OPUS_SILENCE_FRAME),
        duration: OPUS_FRAME_DURATION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livegpt_media::OggWriter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ogg_blob(channels: u8, packets: &[&[u8]]) -> Bytes {
        let mut writer = OggWriter::new(48_000, channels);
        for packet in packets {
            writer.write_packet(packet).unwrap();
        }
        Bytes::from(writer.take_pages())
    }

    #[test]
    fn silence_when_queue_is_empty() {
        let track = OutboundTrack::new();
        let sample = track.next_sample().unwrap();
        assert_eq!(&sample.data[..], &OPUS_SILENCE_FRAME[..]);
        assert_eq!(sample.duration, OPUS_FRAME_DURATION);
    }

    #[test]
    fn plays_sources_in_enqueue_order() {
        let track = OutboundTrack::new();
        track
            .enqueue(ogg_blob(1, &[&[0xf8, 1], &[0xf8, 2]]))
            .unwrap();
        track.enqueue(ogg_blob(1, &[&[0xf8, 3]])).unwrap();

        let played: Vec<u8> = (0..3)
            .map(|_| track.next_sample().unwrap().data[1])
            .collect();
        assert_eq!(played, vec![1, 2, 3]);

        // Queue exhausted, back to silence.
        let sample = track.next_sample().unwrap();
        assert_eq!(&sample.data[..], &OPUS_SILENCE_FRAME[..]);
    }

    #[test]
    fn completion_fires_once_per_source() {
        let track = OutboundTrack::new();
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = completed.clone();
        track.on_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        track.enqueue(ogg_blob(1, &[&[0xf8, 1]])).unwrap();
        track.enqueue(ogg_blob(1, &[&[0xf8, 2]])).unwrap();

        // Two packets, then a silence pull that notices both EOFs.
        track.next_sample().unwrap();
        track.next_sample().unwrap();
        track.next_sample().unwrap();

        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn derives_packet_durations() {
        let track = OutboundTrack::new();
        // TOC 0x18: 60 ms SILK frame.
        track.enqueue(ogg_blob(1, &[&[0x18, 0]])).unwrap();
        let sample = track.next_sample().unwrap();
        assert_eq!(sample.duration, Duration::from_millis(60));
    }

    #[test]
    fn zero_duration_defaults_to_one_frame() {
        let track = OutboundTrack::new();
        // Code-3 packet with a zero frame count: legal framing, no audio.
        track.enqueue(ogg_blob(1, &[&[0xfb, 0]])).unwrap();
        let sample = track.next_sample().unwrap();
        assert_eq!(sample.duration, OPUS_FRAME_DURATION);
    }

    #[test]
    fn rejects_multichannel_sources() {
        let track = OutboundTrack::new();
        let err = track.enqueue(ogg_blob(2, &[&[0xf8, 1]])).unwrap_err();
        assert!(matches!(err, VoiceError::InvalidFormat(_)));
    }

    #[test]
    fn rejects_garbage_sources() {
        let track = OutboundTrack::new();
        assert!(track.enqueue(Bytes::from_static(b"not ogg")).is_err());
    }

    #[test]
    fn close_drains_and_stops() {
        let track = OutboundTrack::new();
        track.enqueue(ogg_blob(1, &[&[0xf8, 1]])).unwrap();
        track.close();

        assert!(track.next_sample().is_none());
        assert_eq!(track.pending_sources(), 0);
        assert!(matches!(
            track.enqueue(ogg_blob(1, &[&[0xf8, 2]])),
            Err(VoiceError::Cancelled)
        ));
    }
}
