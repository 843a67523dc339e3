//! Wake-word tables shared by activation and speech adaptation.
//!
//! Activation in multi-party rooms requires a greeting followed by one of
//! the bot's name tokens within the first words of an utterance. The same
//! tables seed the recognizer's phrase adaptation so short activations
//! ("hey kitt") survive transcription.

/// Greeting tokens accepted as the first half of a wake phrase.
pub static GREETING_WORDS: &[&str] = &[
    "hi", "hello", "hey", "hallo", "salut", "bonjour", "hola", "eh", "ey",
];

/// Name tokens the recognizer commonly produces for the bot.
pub static NAME_WORDS: &[&str] = &["kit", "gpt", "kitt", "livekit", "live-kit", "kid"];

/// How many leading words of a transcript are scanned for a wake phrase.
pub const ACTIVATION_WORDS_LEN: usize = 2;

/// All greeting × name products, for recognizer phrase boosting.
pub fn wake_phrases() -> Vec<String> {
    let mut phrases = Vec::with_capacity(GREETING_WORDS.len() * NAME_WORDS.len());
    for greeting in GREETING_WORDS {
        for name in NAME_WORDS {
            phrases.push(format!("{greeting} {name}"));
        }
    }
    phrases
}
