use std::{sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::domain::{ChatMessage, Generation, GenerationOptions, GenerationResult, TokenUsage};
use crate::core::error::Error as CoreError;
use crate::core::ports::ChatCompletion;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-70b-versatile";

/// Static settings for an [`OpenAiCompatibleClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            provider: "groq".into(),
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            max_tokens: Some(512),
            temperature: Some(0.0),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Single-sample [`ChatCompletion`] against any OpenAI-compatible
/// `/chat/completions` endpoint. It never sends `n`.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    settings: ClientSettings,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(settings: ClientSettings, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(anyhow!("API key may not be empty"));
        }
        if settings.model.trim().is_empty() {
            return Err(anyhow!("Model identifier may not be empty"));
        }
        if settings.base_url.trim().is_empty() {
            return Err(anyhow!("Base URL may not be empty"));
        }

        let http_client = build_http_client(settings.timeout)?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                settings,
                api_key,
                http_client,
            }),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.inner.settings.base_url.trim_end_matches('/')
        )
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        stop: Option<&'a [String]>,
        options: &GenerationOptions,
    ) -> ChatRequest<'a> {
        let settings = &self.inner.settings;
        ChatRequest {
            model: &settings.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: options.max_tokens.or(settings.max_tokens),
            temperature: options.temperature.or(settings.temperature),
            stop: stop.filter(|s| !s.is_empty()),
        }
    }

    fn provider_error(&self, details: impl Into<String>, retryable: bool) -> CoreError {
        CoreError::LlmProvider {
            provider: self.inner.settings.provider.clone(),
            details: details.into(),
            retryable,
        }
    }
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("provider", &self.inner.settings.provider)
            .field("base_url", &self.inner.settings.base_url)
            .field("model", &self.inner.settings.model)
            .finish()
    }
}

#[async_trait]
impl ChatCompletion for OpenAiCompatibleClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        stop: Option<&[String]>,
        options: &GenerationOptions,
    ) -> crate::core::Result<GenerationResult> {
        let request = self.build_request(messages, stop, options);
        let response = self
            .inner
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.inner.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.provider_error(err.to_string(), true))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let retryable = status.as_u16() == 429 || status.is_server_error();
            return Err(self.provider_error(format!("HTTP {status}: {body}"), retryable));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|err| CoreError::MalformedResponse(format!("chat completion: {err}")))?;
        parse_generation(body).map(|generation| GenerationResult::new(vec![generation]))
    }

    fn provider_name(&self) -> &str {
        &self.inner.settings.provider
    }
}

fn parse_generation(body: ChatResponse) -> crate::core::Result<Generation> {
    let usage = body.usage;
    let model = body.model;
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::MalformedResponse("chat completion had no choices".into()))?;
    Ok(Generation {
        text: choice.message.content.unwrap_or_default(),
        finish_reason: choice.finish_reason,
        model,
        usage,
    })
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    // OS proxy discovery is opt-in; set RAGPROBE_ENABLE_SYSTEM_PROXY=1 to use it.
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if std::env::var_os("RAGPROBE_ENABLE_SYSTEM_PROXY").is_none() {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|err| anyhow!("Failed to build HTTP client: {err}"))
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
