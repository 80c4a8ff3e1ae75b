//! Chat completion providers.
//!
//! Every pipeline stage that talks to a language model goes through the
//! [`ChatProvider`] trait: synthetic question generation, classification,
//! relevancy judging, and tool routing. The provider returns the raw
//! message content; callers parse it into their typed records with
//! [`parse_json_payload`].

use crate::config::ChatConfig;
use crate::error::{DendriteError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    /// Ask the model for a JSON object response.
    pub json_response: bool,
}

impl ChatRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature: 0.0,
            json_response: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Trait for chat completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run one completion and return the raw message content.
    async fn chat(&self, request: ChatRequest) -> Result<String>;

    /// Model identifier used for cache keys and logs.
    fn model(&self) -> &str;
}

/// OpenAI chat completions provider.
pub struct OpenAIChatProvider {
    client: Client,
    config: ChatConfig,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl OpenAIChatProvider {
    pub fn new(config: ChatConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| DendriteError::Config("OpenAI API key not configured".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    "Authorization",
                    format!("Bearer {}", api_key)
                        .parse()
                        .map_err(|_| DendriteError::Config("invalid API key".to_string()))?,
                );
                headers.insert(
                    "Content-Type",
                    "application/json"
                        .parse()
                        .expect("static header value"),
                );
                headers
            })
            .build()?;

        info!("Initialized OpenAI chat provider with model: {}", config.model);

        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatProvider for OpenAIChatProvider {
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        debug!(model = %self.config.model, "running chat completion");

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.user,
        });

        let payload = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: request.temperature,
            response_format: request
                .json_response
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(DendriteError::Provider(format!(
                "chat API error: {}",
                error_text
            )));
        }

        let response: CompletionResponse = response.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DendriteError::Provider("chat API returned no choices".to_string()))
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Scripted provider for testing: replays queued responses in order.
pub struct MockChatProvider {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: AtomicUsize,
}

impl MockChatProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a successful response.
    pub fn push_response(&self, content: impl Into<String>) {
        self.script.lock().push_back(Ok(content.into()));
    }

    /// Queue a failed call.
    pub fn push_error(&self, message: impl Into<String>) {
        self.script.lock().push_back(Err(message.into()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockChatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn chat(&self, _request: ChatRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(Ok(content)) => Ok(content),
            Some(Err(message)) => Err(DendriteError::Provider(message)),
            None => Err(DendriteError::Provider("mock script exhausted".to_string())),
        }
    }

    fn model(&self) -> &str {
        "mock-chat"
    }
}

/// Parse a model's JSON reply into a typed value.
///
/// Tolerates markdown code fences around the payload; anything that still
/// fails to deserialize surfaces as an error the batch harness records as
/// an item failure.
pub fn parse_json_payload<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    Ok(serde_json::from_str(trimmed)?)
}
