//! Supported language table.
//!
//! Each entry pins together the BCP-47 code used in participant metadata,
//! the code the speech recognizer expects (not always identical, e.g.
//! `cmn-CN` transcribes as `zh`), and the synthesizer voice for the locale.

/// A supported conversation language.
#[derive(Debug, PartialEq, Eq)]
pub struct Language {
    /// BCP-47 code as carried in participant metadata (e.g. `en-US`).
    pub code: &'static str,
    /// Human-readable label, used in the assistant's prompt preamble.
    pub label: &'static str,
    /// Language code handed to the speech recognizer.
    pub stt_code: &'static str,
    /// Voice identifier handed to the speech synthesizer.
    pub tts_voice: &'static str,
}

/// Static table of supported languages, process lifetime.
pub static LANGUAGES: &[Language] = &[
    Language {
        code: "en-US",
        label: "English",
        stt_code: "en-US",
        tts_voice: "en-US-Wavenet-D",
    },
    Language {
        code: "fr-FR",
        label: "Français",
        stt_code: "fr-FR",
        tts_voice: "fr-FR-Wavenet-B",
    },
    Language {
        code: "de-DE",
        label: "German",
        stt_code: "de-DE",
        tts_voice: "de-DE-Wavenet-B",
    },
    Language {
        code: "ja-JP",
        label: "Japanese",
        stt_code: "ja-JP",
        tts_voice: "ja-JP-Wavenet-B",
    },
    Language {
        code: "cmn-CN",
        label: "Chinese",
        stt_code: "zh",
        tts_voice: "cmn-CN-Wavenet-B",
    },
    Language {
        code: "es-ES",
        label: "Spanish",
        stt_code: "es-ES",
        tts_voice: "es-ES-Wavenet-B",
    },
];

/// The language used when a participant carries no (or an unknown)
/// language code.
pub static DEFAULT_LANGUAGE: &Language = &LANGUAGES[0];

impl Language {
    /// Looks up a language by its BCP-47 code (case-sensitive).
    pub fn find(code: &str) -> Option<&'static Language> {
        LANGUAGES.iter().find(|l| l.code == code)
    }

    /// Looks up a language by code, falling back to [`DEFAULT_LANGUAGE`].
    pub fn find_or_default(code: &str) -> &'static Language {
        Self::find(code).unwrap_or(DEFAULT_LANGUAGE)
    }
}
