//! Script-based language detection for incoming chat messages.
//!
//! The supported audience writes in Odia, Hindi or English, and each
//! Indian language has its own Unicode block, so counting letters per script
//! is enough to pick a language without a statistical model.

/// Result of language detection. Callers apply their own fallback to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedLanguage {
    Detected(&'static str),
    Unknown,
}

impl DetectedLanguage {
    /// The detected code, or `fallback` when detection failed.
    pub fn code_or(self, fallback: &'static str) -> &'static str {
        match self {
            Self::Detected(code) => code,
            Self::Unknown => fallback,
        }
    }
}

/// Letters needed before any guess is made.
const MIN_LETTERS: usize = 2;

/// Unicode blocks mapped to ISO 639-1 codes.
const SCRIPTS: &[(char, char, &str)] = &[
    ('\u{0B00}', '\u{0B7F}', "or"), // Odia
    ('\u{0900}', '\u{097F}', "hi"), // Devanagari
    ('\u{0980}', '\u{09FF}', "bn"), // Bengali
    ('\u{0A00}', '\u{0A7F}', "pa"), // Gurmukhi
    ('\u{0A80}', '\u{0AFF}', "gu"), // Gujarati
    ('\u{0B80}', '\u{0BFF}', "ta"), // Tamil
    ('\u{0C00}', '\u{0C7F}', "te"), // Telugu
    ('\u{0C80}', '\u{0CFF}', "kn"), // Kannada
    ('\u{0D00}', '\u{0D7F}', "ml"), // Malayalam
];

fn script_of(ch: char) -> Option<&'static str> {
    if ch.is_ascii_alphabetic() || matches!(ch, '\u{00C0}'..='\u{024F}') {
        return Some("en");
    }
    SCRIPTS
        .iter()
        .find(|(start, end, _)| (*start..=*end).contains(&ch))
        .map(|(_, _, code)| *code)
}

/// Detect the language of a message from the script its letters are written in.
///
/// Returns `Unknown` for text with fewer than two letters, or when no script
/// covers more than half of the letters.
pub fn detect_language(text: &str) -> DetectedLanguage {
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    let mut letters = 0usize;

    for ch in text.chars().filter(|c| c.is_alphabetic() || is_combining_mark(*c)) {
        let Some(code) = script_of(ch) else {
            continue;
        };
        letters += 1;
        match counts.iter_mut().find(|(c, _)| *c == code) {
            Some((_, n)) => *n += 1,
            None => counts.push((code, 1)),
        }
    }

    if letters < MIN_LETTERS {
        return DetectedLanguage::Unknown;
    }

    counts
        .into_iter()
        .max_by_key(|(_, n)| *n)
        .filter(|(_, n)| n * 2 > letters)
        .map(|(code, _)| DetectedLanguage::Detected(code))
        .unwrap_or(DetectedLanguage::Unknown)
}

/// Indic vowel signs are marks rather than letters but still identify the script.
fn is_combining_mark(ch: char) -> bool {
    SCRIPTS
        .iter()
        .any(|(start, end, _)| (*start..=*end).contains(&ch))
}
