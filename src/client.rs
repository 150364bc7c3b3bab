// src/client.rs

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Per-call timeout enforced by the shared HTTP client.
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

/// A message body is either plain text (completion calls) or an ordered
/// list of text/image parts (vision calls).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatRequest {
    /// One user message carrying plain text.
    pub fn text(model: &str, content: String, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Text(content),
            }],
            max_tokens,
            temperature: 0.1,
        }
    }

    /// One user message carrying an instruction followed by ordered image parts.
    pub fn with_images(model: &str, instruction: &str, image_urls: Vec<String>, max_tokens: u32) -> Self {
        let mut parts = vec![ContentPart::Text {
            text: instruction.to_string(),
        }];
        parts.extend(
            image_urls
                .into_iter()
                .map(|url| ContentPart::ImageUrl {
                    image_url: ImageUrl { url },
                }),
        );
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Parts(parts),
            }],
            max_tokens,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// One chat-completion call against the configured service.
///
/// The trait is the seam between the pipeline and the network; tests swap
/// in [`MockLlmClient`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the request with the given bearer credential and return the
    /// first choice's text.
    async fn chat(&self, credential: &str, request: &ChatRequest) -> Result<String, ApiError>;
}

/// reqwest-backed client for an OpenAI-compatible chat completions endpoint.
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLlmClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, credential: &str, request: &ChatRequest) -> Result<String, ApiError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(credential)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            429 => return Err(ApiError::RateLimited),
            401 => return Err(ApiError::AuthRejected),
            _ if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), "Completion endpoint returned an error");
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ApiError::EmptyResponse)
    }
}

/// Scripted client for tests: answers calls from a queue and records every
/// request it saw.
pub struct MockLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String, ApiError>>>,
    pub requests: std::sync::Mutex<Vec<ChatRequest>>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<Result<String, ApiError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter().collect()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A client that answers every call with the same text.
    pub fn always(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    fn next_response(&self) -> Result<String, ApiError> {
        let mut queue = self.responses.lock().unwrap();
        match queue.len() {
            0 => Err(ApiError::EmptyResponse),
            // Keep replaying the final scripted answer
            1 => match queue.front().unwrap() {
                Ok(text) => Ok(text.clone()),
                Err(_) => queue.pop_front().unwrap(),
            },
            _ => queue.pop_front().unwrap(),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, _credential: &str, request: &ChatRequest) -> Result<String, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.next_response()
    }
}
