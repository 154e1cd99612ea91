//! OpenAI HTTP client.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{AiProvider, ChatMessage, Persona};
use crate::config::OpenAiConfig;
use crate::error::ProviderError;

const CHAT_MAX_TOKENS: u32 = 1000;
const VISION_MAX_TOKENS: u32 = 800;
const IMAGE_SIZE: &str = "1024x1024";
const TRANSCRIBE_LANGUAGE: &str = "ru";

/// [`AiProvider`] backed by the OpenAI REST API.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    config: OpenAiConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiClient {
    /// Build a client whose every request is bounded by `config.request_timeout`.
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T, ProviderError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        parse_json(check_status(response).await?).await
    }

    async fn chat(&self, model: &str, messages: serde_json::Value, max_tokens: u32) -> Result<String, ProviderError> {
        let body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": 0.7,
        });
        let response: ChatResponse = self.post_json("chat/completions", body).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::Malformed("completion has no content".to_string()))
    }
}

/// Turn non-2xx responses into [`ProviderError::Api`] with the API's own message.
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body);
    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Malformed(e.to_string()))
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage], persona: Persona) -> Result<String, ProviderError> {
        let mut full = Vec::with_capacity(messages.len() + 1);
        full.push(ChatMessage::system(persona.system_prompt()));
        full.extend_from_slice(messages);

        debug!("Chat completion with {} messages as {}", full.len(), persona);
        self.chat(&self.config.chat_model, json!(full), CHAT_MAX_TOKENS).await
    }

    async fn describe_image(&self, image: &[u8], question: &str, persona: Persona) -> Result<String, ProviderError> {
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(image));
        let messages = json!([
            {
                "role": "system",
                "content": format!("{} Ты анализируешь изображения.", persona.system_prompt()),
            },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": question },
                    { "type": "image_url", "image_url": { "url": data_url } },
                ],
            },
        ]);
        self.chat(&self.config.vision_model, messages, VISION_MAX_TOKENS).await
    }

    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, ProviderError> {
        let file = Part::bytes(audio).file_name("audio.ogg").mime_str("audio/ogg")?;
        let form = Form::new()
            .text("model", self.config.whisper_model.clone())
            .text("language", TRANSCRIBE_LANGUAGE)
            .part("file", file);

        let response = self
            .http
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;
        let transcription: TranscriptionResponse = parse_json(check_status(response).await?).await?;
        Ok(transcription.text.trim().to_string())
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError> {
        let body = json!({
            "model": self.config.tts_model,
            "voice": voice,
            "input": text,
            "response_format": "mp3",
        });
        let response = self
            .http
            .post(self.url("audio/speech"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let audio = check_status(response).await?.bytes().await?;
        if audio.is_empty() {
            return Err(ProviderError::Malformed("empty speech response".to_string()));
        }
        Ok(audio.to_vec())
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.config.image_model,
            "prompt": prompt,
            "size": IMAGE_SIZE,
            "n": 1,
        });
        let response: ImageResponse = self.post_json("images/generations", body).await?;
        response
            .data
            .into_iter()
            .find_map(|image| image.url)
            .ok_or_else(|| ProviderError::Malformed("image response has no url".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer, timeout: Duration) -> OpenAiClient {
        OpenAiClient::new(OpenAiConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
            chat_model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o".to_string(),
            image_model: "dall-e-3".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            whisper_model: "whisper-1".to_string(),
            request_timeout: timeout,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_sends_persona_and_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    { "role": "system", "content": Persona::Robot.system_prompt() },
                    { "role": "user", "content": "привет" },
                ],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "  Здравствуйте.  " } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let answer = client
            .complete(&[ChatMessage::user("привет")], Persona::Robot)
            .await
            .unwrap();
        assert_eq!(answer, "Здравствуйте.");
    }

    #[tokio::test]
    async fn test_api_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "prompt rejected", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        match client.generate_image("кот").await {
            Err(ProviderError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "prompt rejected");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_image_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(body_partial_json(json!({ "size": "1024x1024", "n": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "url": "https://img.example/cat.png" }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        assert_eq!(client.generate_image("кот").await.unwrap(), "https://img.example/cat.png");
    }

    #[tokio::test]
    async fn test_empty_choices_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let result = client.complete(&[ChatMessage::user("hi")], Persona::Default).await;
        assert!(matches!(result, Err(ProviderError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_millis(100));
        let result = client.complete(&[ChatMessage::user("hi")], Persona::Default).await;
        assert!(matches!(result, Err(ProviderError::Timeout)));
    }

    #[tokio::test]
    async fn test_transcribe_and_synthesize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": " привет мир " })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(body_partial_json(json!({ "voice": "nova", "response_format": "mp3" })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB, 0x90]))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        assert_eq!(client.transcribe(vec![1, 2, 3]).await.unwrap(), "привет мир");
        assert_eq!(client.synthesize("ответ", "nova").await.unwrap(), vec![0xFF, 0xFB, 0x90]);
    }
}
