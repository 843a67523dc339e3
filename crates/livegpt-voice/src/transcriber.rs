//! Rolling streaming transcription for one microphone track.
//!
//! The provider caps a streaming session at roughly five minutes, so the
//! transcriber rotates sessions: proactively before the cap, and whenever
//! the provider reports `OutOfRange` or finishes the stream. Each new
//! session gets a freshly reset OGG serializer so the ID pages are
//! re-emitted. A session is only opened once audio actually arrives;
//! muted microphones must not hold a recognizer stream open.

use std::sync::Arc;
use std::time::Duration;

use livegpt_media::{OggWriter, RtpPacket, TrackCodec};
use livegpt_types::Language;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::VoiceError;
use crate::stt::{RecognizeResult, SessionConfig, SttClient, SttResult};

/// Rotate well before the provider's ~5 minute stream cap.
const MAX_SESSION_DURATION: Duration = Duration::from_secs(4 * 60);

const RTP_CHANNEL_CAPACITY: usize = 256;
const RESULT_CHANNEL_CAPACITY: usize = 32;

/// Per-microphone transcription pipeline.
#[derive(Debug)]
pub struct Transcriber {
    language: &'static Language,
    rtp_tx: mpsc::Sender<RtpPacket>,
    shutdown: watch::Sender<bool>,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Transcriber {
    /// Validates the track codec and starts the session task. Returns the
    /// transcriber and the channel its recognition results arrive on.
    pub fn new(
        codec: TrackCodec,
        client: Arc<dyn SttClient>,
        language: &'static Language,
    ) -> Result<
        (
            Self,
            mpsc::Receiver<Result<RecognizeResult, VoiceError>>,
        ),
        VoiceError,
    > {
        if !codec.is_opus() {
            return Err(VoiceError::UnsupportedCodec);
        }

        let (rtp_tx, rtp_rx) = mpsc::channel(RTP_CHANNEL_CAPACITY);
        let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let config = SessionConfig::for_track(codec.clock_rate, codec.channels, language);
        let handle = tokio::spawn(run(
            codec,
            config,
            client,
            rtp_rx,
            shutdown_rx,
            results_tx,
        ));

        Ok((
            Self {
                language,
                rtp_tx,
                shutdown,
                handle: tokio::sync::Mutex::new(Some(handle)),
            },
            results_rx,
        ))
    }

    pub fn language(&self) -> &'static Language {
        self.language
    }

    /// Feeds one depacketized RTP packet into the pipeline.
    pub async fn write_rtp(&self, packet: RtpPacket) -> Result<(), VoiceError> {
        self.rtp_tx
            .send(packet)
            .await
            .map_err(|_| VoiceError::Cancelled)
    }

    /// Stops the session task; the results channel closes once the
    /// producer has exited. Idempotent.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn run(
    codec: TrackCodec,
    config: SessionConfig,
    client: Arc<dyn SttClient>,
    mut rtp_rx: mpsc::Receiver<RtpPacket>,
    mut shutdown: watch::Receiver<bool>,
    results_tx: mpsc::Sender<Result<RecognizeResult, VoiceError>>,
) {
    let mut writer = OggWriter::new(codec.clock_rate, codec.channels);

    'sessions: loop {
        // Hold off until audio arrives; an idle mic must not burn stream
        // quota on empty sessions.
        let first = tokio::select! {
            _ = shutdown.changed() => break 'sessions,
            packet = rtp_rx.recv() => match packet {
                Some(packet) => packet,
                None => break 'sessions,
            },
        };

        writer.reset();
        if let Err(e) = writer.write_packet(&first.payload) {
            debug!(error = %e, "dropping undecodable opus payload");
        }

        let mut session = match client.open(config.clone()).await {
            Ok(session) => session,
            Err(e) if e.is_cancellation() => break 'sessions,
            Err(e) => {
                let _ = results_tx.send(Err(e)).await;
                break 'sessions;
            }
        };
        info!(language = %config.language_code, "speech session opened");

        let pages = writer.take_pages();
        if !pages.is_empty() && session.audio_tx.send(pages.into()).await.is_err() {
            continue 'sessions;
        }

        let deadline = tokio::time::sleep(MAX_SESSION_DURATION);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break 'sessions,

                () = &mut deadline => {
                    debug!("speech session reached its deadline, rotating");
                    continue 'sessions;
                }

                packet = rtp_rx.recv() => match packet {
                    Some(packet) => {
                        if let Err(e) = writer.write_packet(&packet.payload) {
                            debug!(error = %e, "dropping undecodable opus payload");
                            continue;
                        }
                        let pages = writer.take_pages();
                        if session.audio_tx.send(pages.into()).await.is_err() {
                            continue 'sessions;
                        }
                    }
                    None => break 'sessions,
                },

                update = session.results.recv() => match update {
                    Some(Ok(response)) => {
                        if let Some(message) = response.error {
                            if results_tx.send(Err(VoiceError::Stt(message))).await.is_err() {
                                break 'sessions;
                            }
                            continue;
                        }
                        if let Some(result) = reduce(response.results) {
                            if results_tx.send(Ok(result)).await.is_err() {
                                break 'sessions;
                            }
                        }
                    }
                    // Internal rotation signal; never surfaced downstream.
                    Some(Err(VoiceError::DeadlineExceeded)) => continue 'sessions,
                    Some(Err(e)) if e.is_cancellation() => break 'sessions,
                    Some(Err(e)) => {
                        let _ = results_tx.send(Err(e)).await;
                        break 'sessions;
                    }
                    // The provider finished the stream (single utterance or
                    // half-close); reopen when audio resumes.
                    None => continue 'sessions,
                },
            }
        }
    }
}

/// Collapses one response's results into at most one downstream update:
/// the first final transcript wins, otherwise the interim transcripts are
/// concatenated into a single non-final update.
fn reduce(results: Vec<SttResult>) -> Option<RecognizeResult> {
    let mut interim = String::new();
    for result in results {
        let Some(first) = result.alternatives.into_iter().next() else {
            continue;
        };
        if result.is_final {
            return Some(RecognizeResult {
                text: first,
                is_final: true,
            });
        }
        interim.push_str(&first);
    }

    if interim.is_empty() {
        None
    } else {
        Some(RecognizeResult {
            text: interim,
            is_final: false,
        })
    }
}
