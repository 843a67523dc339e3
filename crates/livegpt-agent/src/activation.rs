//! Activation policy: when does a transcript deserve an answer.
//!
//! Solo rooms answer every final transcript. Multi-party rooms require a
//! wake phrase (greeting before name within the first words); the wake
//! utterance itself is consumed, and the next final from the activated
//! speaker gets the answer. An epoch counter keeps stale idle-watchdogs
//! from clearing a newer activation.
//!
//! All methods are pure state transitions; callers emit packets and
//! spawn timers outside the lock.

use std::time::{Duration, Instant};

use livegpt_types::wake::{ACTIVATION_WORDS_LEN, GREETING_WORDS, NAME_WORDS};
use livegpt_types::Language;

/// How long an activated speaker may stay silent before the activation
/// lapses.
pub const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(4);

/// A recognized wake phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationIntent {
    /// The words that matched, in utterance order.
    pub greeting: String,
    pub name: String,
}

/// Trivial wake-phrase matcher: a greeting word followed by a bot-name
/// word within the first [`ACTIVATION_WORDS_LEN`] words. Deliberately a
/// pure function so a smarter matcher can replace it wholesale.
pub fn detect_wake(text: &str, _language: &Language) -> Option<ActivationIntent> {
    let lowered = text.trim().to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.len() < 2 {
        return None;
    }

    let window = &words[..words.len().min(ACTIVATION_WORDS_LEN)];
    let greeting = window.iter().position(|w| GREETING_WORDS.contains(w))?;
    let name = window.iter().position(|w| NAME_WORDS.contains(w))?;
    if greeting < name {
        Some(ActivationIntent {
            greeting: window[greeting].to_string(),
            name: window[name].to_string(),
        })
    } else {
        None
    }
}

/// What the caller must do after feeding one recognition result in.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResultDecision {
    /// A new activation happened: emit the active state and start an
    /// idle watchdog for this epoch.
    pub activated_epoch: Option<u64>,
    /// Run an answer turn for this transcript.
    pub should_answer: bool,
}

/// Outcome of one watchdog check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// The activation this watchdog guarded was replaced or cleared.
    Stale,
    /// The activation lapsed now: emit the idle state.
    Expired,
    /// Recent activity; check again later.
    StillActive,
}

/// Per-agent activation state. Owned by the agent's state mutex.
#[derive(Debug)]
pub struct ActivationState {
    active_sid: Option<String>,
    epoch: u64,
    last_activity: Instant,
    interim_activated: bool,
}

impl Default for ActivationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivationState {
    pub fn new() -> Self {
        Self {
            active_sid: None,
            epoch: 0,
            last_activity: Instant::now(),
            interim_activated: false,
        }
    }

    pub fn active_sid(&self) -> Option<&str> {
        self.active_sid.as_deref()
    }

    /// Activates a speaker. Returns the new epoch when the activation
    /// actually changed hands; re-activating the current speaker is a
    /// no-op.
    pub fn activate(&mut self, sid: &str, now: Instant) -> Option<u64> {
        if self.active_sid.as_deref() == Some(sid) {
            return None;
        }
        self.epoch += 1;
        self.active_sid = Some(sid.to_string());
        self.last_activity = now;
        Some(self.epoch)
    }

    /// Clears the activation (an answer turn is starting).
    pub fn clear(&mut self) {
        self.active_sid = None;
    }

    /// Feeds one recognition result from `sid` into the policy.
    ///
    /// `humans` is the number of remote (non-bot) participants in the
    /// room; exactly one means a solo room.
    pub fn on_result(
        &mut self,
        sid: &str,
        text: &str,
        is_final: bool,
        humans: usize,
        language: &Language,
        now: Instant,
    ) -> ResultDecision {
        if self.active_sid.as_deref() == Some(sid) {
            self.last_activity = now;
        }

        let mut decision = ResultDecision::default();

        if humans <= 1 {
            // Alone with the bot: no trigger needed. The activation only
            // exists so clients can animate the active speaker.
            if self.active_sid.is_none() {
                decision.activated_epoch = self.activate(sid, now);
            }
            decision.should_answer = is_final;
            return decision;
        }

        let mut just_activated = false;
        if detect_wake(text, language).is_some() {
            just_activated = true;
            self.interim_activated = !is_final;
            if self.active_sid.as_deref() != Some(sid) {
                decision.activated_epoch = self.activate(sid, now);
            }
        }

        if is_final {
            decision.should_answer = self.active_sid.as_deref() == Some(sid);

            // The wake utterance itself is not a prompt: consume it and
            // answer the speaker's next sentence instead.
            let words = text.split_whitespace().count();
            if (just_activated || self.interim_activated) && words <= ACTIVATION_WORDS_LEN + 1 {
                decision.should_answer = false;
            }
        }

        decision
    }

    /// One idle-watchdog check for the given epoch.
    pub fn on_watchdog(&mut self, epoch: u64, now: Instant, timeout: Duration) -> WatchdogVerdict {
        if self.epoch != epoch || self.active_sid.is_none() {
            return WatchdogVerdict::Stale;
        }
        if now.duration_since(self.last_activity) >= timeout {
            self.active_sid = None;
            return WatchdogVerdict::Expired;
        }
        WatchdogVerdict::StillActive
    }
}
