use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::Error as CoreError;
use crate::core::ports::TextSimilarity;

/// Offline similarity: Sørensen-Dice over character bigrams of lowercased text.
#[derive(Debug, Default, Clone)]
pub struct LexicalSimilarity;

impl LexicalSimilarity {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextSimilarity for LexicalSimilarity {
    async fn similarities(
        &self,
        reference: &str,
        candidates: &[String],
    ) -> crate::core::Result<Vec<f64>> {
        let reference = normalize(reference);
        Ok(candidates
            .iter()
            .map(|candidate| strsim::sorensen_dice(&reference, &normalize(candidate)))
            .collect())
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cosine similarity of vectors from an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingSimilarity {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl EmbeddingSimilarity {
    pub fn new(
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.as_ref().trim();
        if base_url.is_empty() {
            return Err(anyhow!("Embeddings URL may not be empty"));
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|err| anyhow!("Failed to build HTTP client: {err}"))?;
        Ok(Self {
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
            http_client,
        })
    }

    async fn embed(&self, inputs: &[&str]) -> crate::core::Result<Vec<Vec<f64>>> {
        let mut request = self.http_client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: inputs,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| self.error(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(format!("HTTP {status}: {body}")));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| CoreError::MalformedResponse(format!("embeddings: {err}")))?;
        if body.data.len() != inputs.len() {
            return Err(CoreError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                body.data.len()
            )));
        }
        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }

    fn error(&self, details: String) -> CoreError {
        CoreError::LlmProvider {
            provider: "embeddings".into(),
            details,
            retryable: true,
        }
    }
}

#[async_trait]
impl TextSimilarity for EmbeddingSimilarity {
    async fn similarities(
        &self,
        reference: &str,
        candidates: &[String],
    ) -> crate::core::Result<Vec<f64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let mut inputs = Vec::with_capacity(candidates.len() + 1);
        inputs.push(reference);
        inputs.extend(candidates.iter().map(String::as_str));

        let vectors = self.embed(&inputs).await?;
        let (reference, rest) = vectors
            .split_first()
            .ok_or_else(|| CoreError::MalformedResponse("no embeddings returned".into()))?;
        Ok(rest.iter().map(|v| cosine(reference, v)).collect())
    }
}

pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f64>,
}
