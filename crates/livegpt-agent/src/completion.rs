//! Prompt assembly for answer turns.
//!
//! Builds the message list for the streaming completion: a fixed system
//! preamble (identity, brevity, the question-mark rule the activation
//! logic relies on, roster, language, date), the meeting history, and
//! the current utterance as a named user turn.

use std::sync::Arc;

use chrono::Utc;
use livegpt_llm::{ChatBackend, ChatMessage, CompletionError, SentenceStream};
use livegpt_types::{Language, MeetingEvent, PresenceKind, SpeechEvent, LANGUAGES};

use crate::room::ParticipantInfo;

/// Streams sentence-chunked answers for a prompt plus meeting context.
pub struct ChatCompleter {
    backend: Arc<dyn ChatBackend>,
}

impl ChatCompleter {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Opens the completion stream for one answer turn. `history` must
    /// not include the prompt itself.
    pub async fn complete(
        &self,
        history: &[MeetingEvent],
        prompt: &SpeechEvent,
        participants: &[ParticipantInfo],
        language: &Language,
    ) -> Result<SentenceStream, CompletionError> {
        let messages = build_messages(history, prompt, participants, language);
        let deltas = self.backend.stream_chat(messages).await?;
        Ok(SentenceStream::new(deltas))
    }
}

fn build_messages(
    history: &[MeetingEvent],
    prompt: &SpeechEvent,
    participants: &[ParticipantInfo],
    language: &Language,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(preamble(participants, language)));

    for event in history {
        match event {
            MeetingEvent::Speech(speech) if speech.is_bot => {
                messages.push(ChatMessage::assistant(speech.text.clone()));
            }
            MeetingEvent::Speech(speech) => {
                messages.push(ChatMessage::named_user(
                    speech.participant_name.clone(),
                    speech.text.clone(),
                ));
            }
            MeetingEvent::Presence(presence) => {
                let verb = match presence.kind {
                    PresenceKind::Joined => "joined",
                    PresenceKind::Left => "left",
                };
                messages.push(ChatMessage::system(format!(
                    "{} {} the meeting at {}",
                    presence.participant_name,
                    verb,
                    presence.at.format("%H:%M:%S"),
                )));
            }
        }
    }

    messages.push(ChatMessage::named_user(
        prompt.participant_name.clone(),
        prompt.text.clone(),
    ));
    messages
}

fn preamble(participants: &[ParticipantInfo], language: &Language) -> String {
    let roster = if participants.is_empty() {
        "nobody else".to_string()
    } else {
        participants
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "You are a voice assistant named KITT in a video conference. \
         Keep your answers as short as possible, using multiple small \
         sentences that end with a dot. If you answer with a question, \
         end it with a question mark. The participants in the meeting \
         are: {roster}. Speak {label} unless asked otherwise. The \
         current date is {date}.",
        roster = roster,
        label = language.label,
        date = Utc::now().format("%A, %B %e, %Y"),
    )
}

/// Strips an optional leading language tag from a sentence chunk.
///
/// The model occasionally prefixes a chunk with `<fr-FR>` or a bare
/// `fr-FR` when switching language; the tag selects the synthesis voice
/// for that chunk and the ones after it.
pub fn split_language_prefix(chunk: &str) -> (Option<&'static Language>, &str) {
    let trimmed = chunk.trim_start();

    for language in LANGUAGES {
        let bracketed = format!("<{}>", language.code);
        for prefix in [bracketed.as_str(), language.code] {
            let bytes = prefix.as_bytes();
            if trimmed.len() >= bytes.len()
                && trimmed.as_bytes()[..bytes.len()].eq_ignore_ascii_case(bytes)
            {
                return (Some(language), &trimmed[bytes.len()..]);
            }
        }
    }

    (None, chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use livegpt_llm::Role;
    use livegpt_types::DEFAULT_LANGUAGE;

    fn participant(name: &str) -> ParticipantInfo {
        ParticipantInfo {
            sid: format!("PA_{name}"),
            identity: name.to_string(),
            name: name.to_string(),
            metadata: String::new(),
        }
    }

    fn prompt(name: &str, text: &str) -> SpeechEvent {
        SpeechEvent {
            participant_name: name.to_string(),
            is_bot: false,
            text: text.to_string(),
        }
    }

    #[test]
    fn preamble_names_bot_roster_and_language() {
        let text = preamble(&[participant("alice"), participant("bob")], DEFAULT_LANGUAGE);
        assert!(text.contains("KITT"));
        assert!(text.contains("alice, bob"));
        assert!(text.contains("English"));
        assert!(text.contains("question mark"));
    }

    #[test]
    fn history_maps_to_roles() {
        let history = vec![
            MeetingEvent::user_speech("alice", "hello there"),
            MeetingEvent::bot_speech("KITT", "Hello alice."),
            MeetingEvent::presence("bob", PresenceKind::Joined, Utc::now()),
        ];

        let messages = build_messages(
            &history,
            &prompt("alice", "what now"),
            &[participant("alice")],
            DEFAULT_LANGUAGE,
        );

        // preamble + three history entries + prompt
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].name.as_deref(), Some("alice"));
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].role, Role::System);
        assert!(messages[3].content.contains("joined"));
        assert_eq!(messages[4].role, Role::User);
        assert_eq!(messages[4].content, "what now");
    }

    #[test]
    fn bracketed_prefix_is_stripped() {
        let (language, rest) = split_language_prefix("<fr-FR>Bonjour tout le monde.");
        assert_eq!(language.unwrap().code, "fr-FR");
        assert_eq!(rest, "Bonjour tout le monde.");
    }

    #[test]
    fn bare_prefix_is_stripped_case_insensitively() {
        let (language, rest) = split_language_prefix("  de-de Guten Tag.");
        assert_eq!(language.unwrap().code, "de-DE");
        assert_eq!(rest, " Guten Tag.");
    }

    #[test]
    fn unprefixed_chunks_pass_through() {
        let (language, rest) = split_language_prefix("Nothing to see here.");
        assert!(language.is_none());
        assert_eq!(rest, "Nothing to see here.");
    }
}
