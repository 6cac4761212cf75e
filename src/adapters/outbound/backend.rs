use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::debug;

use crate::core::domain::BackendAnswer;
use crate::core::error::Error as CoreError;
use crate::core::ports::RagBackend;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080/api/chat";
pub const DEFAULT_CHAT_ID: &str = "evaluation-session";

/// Where and how to reach the chat endpoint of the system under test.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub url: String,
    pub chat_id: String,
    pub mode: Option<String>,
    pub timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.into(),
            chat_id: DEFAULT_CHAT_ID.into(),
            mode: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// [`RagBackend`] that posts the raw question text to the chat endpoint.
#[derive(Debug, Clone)]
pub struct HttpRagBackend {
    settings: BackendSettings,
    http_client: reqwest::Client,
}

impl HttpRagBackend {
    pub fn new(settings: BackendSettings) -> Result<Self> {
        if settings.url.trim().is_empty() {
            return Err(anyhow!("Backend URL may not be empty"));
        }
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .no_proxy()
            .build()
            .map_err(|err| anyhow!("Failed to build HTTP client: {err}"))?;
        Ok(Self {
            settings,
            http_client,
        })
    }

    fn query_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![("chatId", self.settings.chat_id.as_str())];
        if let Some(mode) = &self.settings.mode {
            params.push(("mode", mode.as_str()));
        }
        params
    }

    fn backend_error(&self, details: impl Into<String>) -> CoreError {
        CoreError::Backend {
            url: self.settings.url.clone(),
            details: details.into(),
        }
    }
}

#[async_trait]
impl RagBackend for HttpRagBackend {
    async fn ask(&self, question: &str) -> crate::core::Result<BackendAnswer> {
        debug!(url = %self.settings.url, chat_id = %self.settings.chat_id, "querying backend");
        let response = self
            .http_client
            .post(&self.settings.url)
            .query(&self.query_params())
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(question.to_owned())
            .send()
            .await
            .map_err(|err| self.backend_error(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.backend_error(format!("HTTP {status}: {body}")));
        }

        let raw = response
            .text()
            .await
            .map_err(|err| self.backend_error(err.to_string()))?;
        parse_backend_answer(&raw)
    }
}

pub fn parse_backend_answer(raw: &str) -> crate::core::Result<BackendAnswer> {
    serde_json::from_str(raw)
        .map_err(|err| CoreError::MalformedResponse(format!("backend answer: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_answer_and_excerpts_in_order() {
        let answer = parse_backend_answer(
            r#"{
                "answer": "It ingests documents.",
                "sources": [
                    {"filename": "a.pdf", "excerpt": "first", "chunkIndex": 0},
                    {"filename": "b.pdf", "excerpt": "second", "chunkIndex": 4}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(answer.answer, "It ingests documents.");
        assert_eq!(answer.contexts(), vec!["first", "second"]);
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = parse_backend_answer("<html>oops</html>").unwrap_err();
        assert!(matches!(err, CoreError::MalformedResponse(_)));
    }

    #[test]
    fn mode_is_only_sent_when_configured() {
        let backend = HttpRagBackend::new(BackendSettings::default()).unwrap();
        assert_eq!(backend.query_params(), vec![("chatId", DEFAULT_CHAT_ID)]);

        let backend = HttpRagBackend::new(BackendSettings {
            mode: Some("WEB".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            backend.query_params(),
            vec![("chatId", DEFAULT_CHAT_ID), ("mode", "WEB")]
        );
    }

    #[test]
    fn rejects_blank_url() {
        let err = HttpRagBackend::new(BackendSettings {
            url: " ".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("Backend URL"));
    }
}
