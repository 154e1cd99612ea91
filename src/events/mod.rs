//! Inbound message handling.
//!
//! [`classify`] decides what a text message asks for, [`Assistant`] runs the
//! request and produces a [`Reply`], and `handlers` moves both in and out of
//! Telegram.

pub mod assistant;
pub mod handlers;

pub use assistant::{Assistant, Caller};
pub use handlers::message_event_handler;

/// Text prefixes that ask for an image.
pub const IMAGE_PREFIXES: [&str; 3] = ["сгенерируй", "создай", "нарисуй"];

pub const REMINDER_PREFIX: &str = "напомни";
pub const CALC_PREFIX: &str = "calc";

/// What a text message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Full text, parsed by the reminder parser.
    Reminder(String),
    /// Expression after `calc`.
    Calc(String),
    /// Prompt after the image verb.
    GenerateImage(String),
    Chat(String),
}

/// Classify a non-command text message.
pub fn classify(text: &str) -> Intent {
    let text = text.trim();

    if strip_word(text, REMINDER_PREFIX).is_some() {
        return Intent::Reminder(text.to_string());
    }
    if let Some(expr) = strip_word(text, CALC_PREFIX) {
        return Intent::Calc(expr.to_string());
    }
    for prefix in IMAGE_PREFIXES {
        if let Some(prompt) = strip_word(text, prefix) {
            return Intent::GenerateImage(prompt.to_string());
        }
    }
    Intent::Chat(text.to_string())
}

/// If `text` starts with the word `prefix` (case-insensitive), return the rest.
fn strip_word<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head_end = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .nth(prefix.chars().count())?;

    let (head, rest) = text.split_at(head_end);
    if head.to_lowercase() != prefix {
        return None;
    }
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// Outcome of handling one request, independent of Telegram.
///
/// Text is Telegram HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Photo { url: String, caption: String },
    /// MP3 answer plus the transcript and answer as text.
    Voice { audio: Vec<u8>, text: String },
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) => text,
            Reply::Photo { caption, .. } => caption,
            Reply::Voice { text, .. } => text,
        }
    }
}
