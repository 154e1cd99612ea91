//! Hosted AI provider.
//!
//! The pipeline talks to [`AiProvider`]; [`OpenAiClient`] implements it over
//! the OpenAI HTTP API. Tests substitute a scripted fake.

mod openai;
mod persona;

use async_trait::async_trait;
use serde::Serialize;

pub use openai::OpenAiClient;
pub use persona::Persona;

use crate::database::{HistoryMessage, Role};
use crate::error::ProviderError;

/// One message of a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User.as_str(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant.as_str(),
            content: content.into(),
        }
    }
}

impl From<&HistoryMessage> for ChatMessage {
    fn from(message: &HistoryMessage) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.content.clone(),
        }
    }
}

/// Operations the bot needs from a model provider.
///
/// Implementations bound every call with a timeout and never retry.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Chat completion over `messages` with the persona's system prompt.
    async fn complete(&self, messages: &[ChatMessage], persona: Persona) -> Result<String, ProviderError>;

    /// Answer `question` about a JPEG image.
    async fn describe_image(&self, image: &[u8], question: &str, persona: Persona) -> Result<String, ProviderError>;

    /// Speech to text for an OGG voice note.
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, ProviderError>;

    /// Text to speech, returning MP3 bytes.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError>;

    /// Generate an image and return its URL.
    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError>;
}
