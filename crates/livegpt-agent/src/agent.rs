//! The per-room orchestrator.
//!
//! One [`Agent`] lives in one room. It subscribes to every human
//! microphone, feeds transcripts through the activation policy, and runs
//! at most one answer turn at a time: stream the model response, strip
//! the optional language tag per sentence, synthesize sentences
//! concurrently, and enqueue the audio in emission order on the
//! published track. Lifecycle state and transcripts are mirrored to
//! clients over the data channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use livegpt_llm::ChatBackend;
use livegpt_types::{
    AgentState, Language, MeetingEvent, ParticipantMetadata, PresenceKind, SignalPacket,
    SpeechEvent, TranscriptPacket, BOT_IDENTITY, DEFAULT_LANGUAGE,
};
use livegpt_voice::{
    OutboundTrack, RecognizeResult, SttClient, Synthesizer, Transcriber, VoiceError,
};
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tracing::{debug, error, info, warn};

use crate::activation::{ActivationState, WatchdogVerdict, ACTIVATION_TIMEOUT};
use crate::completion::{split_language_prefix, ChatCompleter};
use crate::error::AgentError;
use crate::room::{
    ConnectRequest, ParticipantInfo, RemoteTrack, RoomConnector, RoomEvent, RoomHandle, TrackInfo,
    TrackSource,
};

/// Grace period before an agent leaves a room nobody showed up to.
const EMPTY_ROOM_GRACE: Duration = Duration::from_secs(5);

/// Process-scoped provider clients, shared by reference across agents.
#[derive(Clone)]
pub struct Providers {
    pub stt: Arc<dyn SttClient>,
    pub tts: Arc<dyn Synthesizer>,
    pub llm: Arc<dyn ChatBackend>,
}

/// Tunables, defaulted for production; tests shorten them.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub activation_timeout: Duration,
    pub empty_room_grace: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            activation_timeout: ACTIVATION_TIMEOUT,
            empty_room_grace: EMPTY_ROOM_GRACE,
        }
    }
}

struct AgentInner {
    conversation: Vec<MeetingEvent>,
    activation: ActivationState,
    transcribers: HashMap<String, Arc<Transcriber>>,
}

struct Core {
    room: Arc<dyn RoomHandle>,
    providers: Providers,
    completer: ChatCompleter,
    options: AgentOptions,
    track: Arc<OutboundTrack>,
    // Conversation, activation, and transcriber state share one mutex;
    // critical sections stay short and never perform I/O.
    state: Mutex<AgentInner>,
    is_busy: AtomicBool,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    on_disconnected: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// The bot participant of one room. Cheap to clone; every clone drives
/// the same underlying agent.
#[derive(Clone)]
pub struct Agent {
    core: Arc<Core>,
}

impl Agent {
    /// Joins the room, publishes the outbound track, and starts the
    /// event loop plus the empty-room guard.
    pub async fn connect(
        connector: &dyn RoomConnector,
        request: ConnectRequest,
        providers: Providers,
        options: AgentOptions,
    ) -> Result<Self, AgentError> {
        let (room, events) = connector.connect(&request).await?;

        let track = Arc::new(OutboundTrack::new());
        room.publish_track(track.clone()).await?;

        let completer = ChatCompleter::new(providers.llm.clone());
        let (shutdown, _) = watch::channel(false);
        let agent = Self {
            core: Arc::new(Core {
                room,
                providers,
                completer,
                options,
                track,
                state: Mutex::new(AgentInner {
                    conversation: Vec::new(),
                    activation: ActivationState::new(),
                    transcribers: HashMap::new(),
                }),
                is_busy: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                shutdown,
                on_disconnected: Mutex::new(None),
            }),
        };

        info!(room = %agent.core.room.name(), "agent connected");

        let worker = agent.clone();
        tokio::spawn(async move { worker.run_events(events).await });

        // The room may have been created and abandoned before anyone
        // arrived; leave instead of idling forever.
        let guard = agent.clone();
        tokio::spawn(async move {
            let mut shutdown = guard.core.shutdown.subscribe();
            tokio::select! {
                _ = tokio::time::sleep(guard.core.options.empty_room_grace) => {}
                _ = shutdown.changed() => return,
            }
            if guard.core.room.remote_participants().is_empty() {
                info!(room = %guard.core.room.name(), "room still empty, leaving");
                guard.close().await;
            }
        });

        Ok(agent)
    }

    /// Registers the callback fired once when the agent has shut down.
    pub fn on_disconnected(&self, callback: impl FnOnce() + Send + 'static) {
        *self
            .core
            .on_disconnected
            .lock()
            .expect("agent mutex poisoned") = Some(Box::new(callback));
    }

    pub fn room_name(&self) -> String {
        self.core.room.name()
    }

    pub fn is_busy(&self) -> bool {
        self.core.is_busy.load(Ordering::SeqCst)
    }

    /// Snapshot of the meeting history so far.
    pub fn conversation(&self) -> Vec<MeetingEvent> {
        self.core
            .state
            .lock()
            .expect("agent mutex poisoned")
            .conversation
            .clone()
    }

    /// Disconnects from the room and cancels every task the agent owns.
    /// Idempotent.
    pub async fn close(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(room = %self.core.room.name(), "disconnecting agent");

        let _ = self.core.shutdown.send(true);
        self.core.room.disconnect().await;
        self.core.track.close();

        let transcribers: Vec<_> = {
            let mut state = self.core.state.lock().expect("agent mutex poisoned");
            state.transcribers.drain().map(|(_, t)| t).collect()
        };
        for transcriber in transcribers {
            transcriber.close().await;
        }

        let callback = self
            .core
            .on_disconnected
            .lock()
            .expect("agent mutex poisoned")
            .take();
        if let Some(callback) = callback {
            callback();
        }
    }

    async fn run_events(self, mut events: mpsc::UnboundedReceiver<RoomEvent>) {
        let mut shutdown = self.core.shutdown.subscribe();
        loop {
            let event = tokio::select! {
                _ = shutdown.changed() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                RoomEvent::TrackPublished { track, participant } => {
                    self.on_track_published(track, participant).await;
                }
                RoomEvent::TrackSubscribed { track, participant } => {
                    self.on_track_subscribed(track, participant);
                }
                RoomEvent::TrackUnsubscribed { participant, .. } => {
                    self.on_track_unsubscribed(&participant).await;
                }
                RoomEvent::ParticipantConnected(participant) => {
                    self.on_participant_connected(&participant);
                }
                RoomEvent::ParticipantDisconnected(participant) => {
                    self.on_participant_disconnected(&participant).await;
                }
                RoomEvent::DataReceived { .. } => {}
                RoomEvent::Disconnected => {
                    self.close().await;
                    break;
                }
            }
        }
    }

    async fn on_track_published(&self, track: TrackInfo, participant: ParticipantInfo) {
        if participant.identity == BOT_IDENTITY {
            return;
        }
        if !matches!(track.source, TrackSource::Microphone) {
            return;
        }
        if let Err(e) = self.core.room.set_subscribed(&track.sid, true).await {
            error!(track = %track.sid, participant = %participant.sid, error = %e,
                "failed to subscribe to the track");
        }
    }

    fn on_track_subscribed(&self, track: Arc<dyn RemoteTrack>, participant: ParticipantInfo) {
        if participant.identity == BOT_IDENTITY {
            return;
        }

        let metadata = ParticipantMetadata::parse(&participant.metadata);
        let language = metadata
            .language_code
            .as_deref()
            .map(Language::find_or_default)
            .unwrap_or(DEFAULT_LANGUAGE);

        let info = track.info();
        let (transcriber, mut results) =
            match Transcriber::new(info.codec, self.core.providers.stt.clone(), language) {
                Ok(created) => created,
                Err(e) => {
                    // Typically an unsupported codec; the track is simply
                    // ignored and the agent keeps serving other mics.
                    error!(participant = %participant.identity, error = %e,
                        "failed to create the transcriber");
                    return;
                }
            };
        let transcriber = Arc::new(transcriber);

        {
            let mut state = self.core.state.lock().expect("agent mutex poisoned");
            if state.transcribers.contains_key(&participant.sid) {
                return;
            }
            state
                .transcribers
                .insert(participant.sid.clone(), transcriber.clone());
        }

        info!(participant = %participant.identity, language = %language.code,
            "starting to transcribe");

        let consumer = self.clone();
        let speaker = participant.clone();
        tokio::spawn(async move {
            while let Some(result) = results.recv().await {
                consumer.on_transcription(result, &speaker, language).await;
            }
        });

        let pump_target = transcriber.clone();
        tokio::spawn(async move {
            while let Some(packet) = track.read_rtp().await {
                if pump_target.write_rtp(packet).await.is_err() {
                    break;
                }
            }
            debug!(participant = %participant.identity, "rtp pump finished");
        });
    }

    async fn on_track_unsubscribed(&self, participant: &ParticipantInfo) {
        let transcriber = {
            let mut state = self.core.state.lock().expect("agent mutex poisoned");
            state.transcribers.remove(&participant.sid)
        };
        if let Some(transcriber) = transcriber {
            transcriber.close().await;
        }
    }

    fn on_participant_connected(&self, participant: &ParticipantInfo) {
        if participant.identity == BOT_IDENTITY {
            return;
        }
        let mut state = self.core.state.lock().expect("agent mutex poisoned");
        state.conversation.push(MeetingEvent::presence(
            participant.name.clone(),
            PresenceKind::Joined,
            Utc::now(),
        ));
    }

    async fn on_participant_disconnected(&self, participant: &ParticipantInfo) {
        {
            let mut state = self.core.state.lock().expect("agent mutex poisoned");
            state.conversation.push(MeetingEvent::presence(
                participant.name.clone(),
                PresenceKind::Left,
                Utc::now(),
            ));
        }

        let remaining = self.core.room.remote_participants().len();
        debug!(remaining, "participant disconnected");
        if remaining == 0 {
            self.close().await;
        }
    }

    async fn on_transcription(
        &self,
        result: Result<RecognizeResult, VoiceError>,
        participant: &ParticipantInfo,
        language: &'static Language,
    ) {
        let result = match result {
            Ok(result) => result,
            Err(e) if e.is_cancellation() => return,
            Err(e) => {
                warn!(participant = %participant.identity, error = %e, "transcription error");
                self.send_packet(SignalPacket::error(format!(
                    "Sorry, an error occurred while transcribing {}'s speech",
                    participant.name
                )))
                .await;
                return;
            }
        };

        // Every result, interim or final, is mirrored to clients.
        self.send_packet(SignalPacket::Transcript(TranscriptPacket {
            sid: participant.sid.clone(),
            name: participant.name.clone(),
            text: result.text.clone(),
            is_final: result.is_final,
        }))
        .await;

        let humans = self.core.room.remote_participants().len();
        let decision = {
            let mut state = self.core.state.lock().expect("agent mutex poisoned");
            state.activation.on_result(
                &participant.sid,
                &result.text,
                result.is_final,
                humans,
                language,
                Instant::now(),
            )
        };

        if let Some(epoch) = decision.activated_epoch {
            debug!(participant = %participant.identity, "speaker activated");
            self.send_state(AgentState::Active).await;
            self.spawn_watchdog(epoch);
        }

        if !(decision.should_answer && result.is_final) {
            return;
        }

        let prompt = SpeechEvent {
            participant_name: participant.identity.clone(),
            is_bot: false,
            text: result.text.clone(),
        };

        // History snapshot excludes the prompt; the prompt joins the
        // conversation now and the activation is spent.
        let history = {
            let mut state = self.core.state.lock().expect("agent mutex poisoned");
            let history = state.conversation.clone();
            state.conversation.push(MeetingEvent::Speech(prompt.clone()));
            state.activation.clear();
            history
        };

        if self
            .core
            .is_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let agent = self.clone();
            let speaker = participant.clone();
            tokio::spawn(async move {
                agent.answer(history, prompt, speaker, language).await;
                agent.core.is_busy.store(false, Ordering::SeqCst);
            });
        } else {
            debug!(participant = %participant.identity, "already answering, trigger ignored");
        }
    }

    /// One answer turn: stream the completion, synthesize sentence by
    /// sentence, enqueue in emission order, wait for playback, then
    /// either hand the floor back (`?`) or go idle.
    async fn answer(
        &self,
        history: Vec<MeetingEvent>,
        prompt: SpeechEvent,
        participant: ParticipantInfo,
        mut language: &'static Language,
    ) {
        self.send_state(AgentState::Loading).await;
        debug!(participant = %participant.identity, text = %prompt.text, "answering");

        let mut shutdown = self.core.shutdown.subscribe();
        let participants = self.core.room.remote_participants();

        let mut stream = match self
            .core
            .completer
            .complete(&history, &prompt, &participants, language)
            .await
        {
            Ok(stream) => stream,
            Err(e) if e.is_cancellation() => return,
            Err(e) => {
                warn!(error = %e, "failed to open the completion stream");
                self.send_packet(SignalPacket::error(
                    "Sorry, an error occurred while communicating with OpenAI. \
                     Max context length reached?",
                ))
                .await;
                self.send_state(AgentState::Idle).await;
                return;
            }
        };

        let playback = Arc::new(PlaybackBarrier::default());
        {
            let playback = playback.clone();
            self.core.track.on_complete(move || playback.complete_one());
        }

        let mut synth_tasks = Vec::new();
        let mut previous: Option<oneshot::Receiver<()>> = None;
        let mut answer = String::new();

        loop {
            let chunk = tokio::select! {
                _ = shutdown.changed() => return,
                chunk = stream.recv() => chunk,
            };
            let chunk = match chunk {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) if e.is_cancellation() => break,
                Some(Err(e)) => {
                    warn!(error = %e, "completion stream failed");
                    self.send_packet(SignalPacket::error(
                        "Sorry, an error occurred while communicating with OpenAI. \
                         It can happen when the servers are overloaded",
                    ))
                    .await;
                    self.send_state(AgentState::Idle).await;
                    return;
                }
            };

            let (chunk_language, rest) = split_language_prefix(&chunk);
            if let Some(switched) = chunk_language {
                language = switched;
            }
            let sentence = rest.trim().to_string();
            if sentence.is_empty() {
                continue;
            }

            answer.push_str(&sentence);
            answer.push(' ');

            // Synthesis fans out, but a chunk is only enqueued after its
            // predecessor: playback order equals emission order even when
            // synthesis latencies invert.
            let (done_tx, done_rx) = oneshot::channel::<()>();
            let wait_for = previous.replace(done_rx);

            let agent = self.clone();
            let chunk_lang = language;
            let barrier = playback.clone();
            synth_tasks.push(tokio::spawn(async move {
                debug!(sentence = %sentence, "synthesizing");
                let synthesized = agent
                    .core
                    .providers
                    .tts
                    .synthesize(&sentence, chunk_lang)
                    .await;

                if let Some(predecessor) = wait_for {
                    let _ = predecessor.await;
                }

                match synthesized {
                    Ok(audio) => {
                        barrier.expect_one();
                        match agent.core.track.enqueue(audio) {
                            Ok(()) => agent.send_state(AgentState::Speaking).await,
                            Err(e) => {
                                barrier.complete_one();
                                debug!(error = %e, "dropping synthesized chunk");
                            }
                        }
                    }
                    Err(e) if e.is_cancellation() => {}
                    Err(e) => {
                        warn!(sentence = %sentence, error = %e, "failed to synthesize");
                        agent
                            .send_packet(SignalPacket::error(
                                "Sorry, an error occurred while synthesizing voice data \
                                 using Google TTS",
                            ))
                            .await;
                    }
                }

                let _ = done_tx.send(());
            }));
        }

        for task in synth_tasks {
            let _ = task.await;
        }
        tokio::select! {
            _ = shutdown.changed() => return,
            () = playback.wait_idle() => {}
        }

        let answer = answer.trim_end().to_string();
        {
            let mut state = self.core.state.lock().expect("agent mutex poisoned");
            state
                .conversation
                .push(MeetingEvent::bot_speech(BOT_IDENTITY, answer.clone()));
        }

        // Ending on a question hands the floor back to the prompter, so
        // the conversation continues without a fresh wake phrase.
        if answer.ends_with('?') {
            let epoch = {
                let mut state = self.core.state.lock().expect("agent mutex poisoned");
                state.activation.activate(&participant.sid, Instant::now())
            };
            if let Some(epoch) = epoch {
                self.send_state(AgentState::Active).await;
                self.spawn_watchdog(epoch);
            }
        } else {
            self.send_state(AgentState::Idle).await;
        }
    }

    fn spawn_watchdog(&self, epoch: u64) {
        let agent = self.clone();
        tokio::spawn(async move {
            let mut shutdown = agent.core.shutdown.subscribe();
            let timeout = agent.core.options.activation_timeout;
            let recheck = timeout.min(Duration::from_secs(1));

            tokio::select! {
                _ = tokio::time::sleep(timeout) => {}
                _ = shutdown.changed() => return,
            }
            loop {
                let verdict = {
                    let mut state = agent.core.state.lock().expect("agent mutex poisoned");
                    state.activation.on_watchdog(epoch, Instant::now(), timeout)
                };
                match verdict {
                    WatchdogVerdict::Stale => return,
                    WatchdogVerdict::Expired => {
                        debug!("activation timed out");
                        agent.send_state(AgentState::Idle).await;
                        return;
                    }
                    WatchdogVerdict::StillActive => {}
                }
                tokio::select! {
                    _ = tokio::time::sleep(recheck) => {}
                    _ = shutdown.changed() => return,
                }
            }
        });
    }

    async fn send_state(&self, state: AgentState) {
        self.send_packet(SignalPacket::state(state)).await;
    }

    async fn send_packet(&self, packet: SignalPacket) {
        match serde_json::to_vec(&packet) {
            Ok(payload) => {
                if let Err(e) = self.core.room.publish_data(payload).await {
                    debug!(error = %e, "failed to publish data packet");
                }
            }
            Err(e) => error!(error = %e, "failed to encode data packet"),
        }
    }
}

/// Counts outstanding playback sources for one answer turn.
#[derive(Default)]
struct PlaybackBarrier {
    pending: Mutex<usize>,
    notify: Notify,
}

impl PlaybackBarrier {
    fn expect_one(&self) {
        *self.pending.lock().expect("barrier mutex poisoned") += 1;
    }

    fn complete_one(&self) {
        let mut pending = self.pending.lock().expect("barrier mutex poisoned");
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.notify.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            if *self.pending.lock().expect("barrier mutex poisoned") == 0 {
                return;
            }
            notified.await;
        }
    }
}
