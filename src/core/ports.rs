use async_trait::async_trait;

use crate::core::domain::{
    BackendAnswer, ChatMessage, EvaluationReport, GenerationOptions, GenerationResult,
};
use crate::core::error::Result;

/// A provider call that produces exactly one completion per request.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Request a single completion. `options.n` is ignored by implementations.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        stop: Option<&[String]>,
        options: &GenerationOptions,
    ) -> Result<GenerationResult>;

    /// Short provider label used in logs and errors.
    fn provider_name(&self) -> &str;
}

/// Generates `options.n` candidates for one prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        stop: Option<&[String]>,
        options: &GenerationOptions,
    ) -> Result<GenerationResult>;
}

/// The RAG system under evaluation.
#[async_trait]
pub trait RagBackend: Send + Sync {
    async fn ask(&self, question: &str) -> Result<BackendAnswer>;
}

/// Scores how close each candidate text is to a reference text, in `[0, 1]`.
#[async_trait]
pub trait TextSimilarity: Send + Sync {
    async fn similarities(&self, reference: &str, candidates: &[String]) -> Result<Vec<f64>>;
}

/// Abstraction for rendering prompt templates.
pub trait PromptRenderer: Send + Sync {
    /// Render a template with the given data.
    fn render(&self, template: &str, data: &serde_json::Value) -> Result<String>;
}

/// Persists a finished evaluation.
pub trait ReportWriter: Send + Sync {
    fn write(&self, report: &EvaluationReport) -> Result<()>;
}
