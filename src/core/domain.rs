//! Value types shared by the ports, the sampling adapter and the evaluation service.

use serde::{Deserialize, Serialize};

/// Speaker of a single chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged turn of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call generation parameters.
///
/// `n` is the requested sample count; everything else is forwarded to the
/// provider untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub n: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            n: 1,
            max_tokens: None,
            temperature: None,
        }
    }
}

impl GenerationOptions {
    pub fn with_samples(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    /// Same options with the sample count reset to a single completion.
    pub fn single(&self) -> Self {
        Self {
            n: 1,
            ..self.clone()
        }
    }
}

/// Token accounting reported by the provider for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One generated candidate plus whatever metadata the provider returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    pub text: String,
    pub finish_reason: Option<String>,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
            model: None,
            usage: None,
        }
    }
}

/// Ordered candidates for one generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationResult {
    pub generations: Vec<Generation>,
}

impl GenerationResult {
    pub fn new(generations: Vec<Generation>) -> Self {
        Self { generations }
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.generations.iter().map(|g| g.text.as_str())
    }

    /// Text of the first candidate, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.generations.first().map(|g| g.text.as_str())
    }
}

/// A question with its reference answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub question: String,
    pub ground_truth: String,
}

/// A source document cited by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub chunk_index: i64,
}

/// What the RAG backend returned for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendAnswer {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceDocument>,
}

impl BackendAnswer {
    pub fn contexts(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.excerpt.clone()).collect()
    }
}

/// A test case joined with the backend's answer, ready to be scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationSample {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truth: String,
}

impl EvaluationSample {
    pub fn from_answer(case: &TestCase, answer: BackendAnswer) -> Self {
        let contexts = answer.contexts();
        Self {
            question: case.question.clone(),
            answer: answer.answer,
            contexts,
            ground_truth: case.ground_truth.clone(),
        }
    }
}

/// The metrics computed per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Faithfulness,
    AnswerRelevancy,
    ContextPrecision,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Faithfulness,
        MetricKind::AnswerRelevancy,
        MetricKind::ContextPrecision,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Faithfulness => "faithfulness",
            MetricKind::AnswerRelevancy => "answer_relevancy",
            MetricKind::ContextPrecision => "context_precision",
        }
    }
}

/// Scores for one sample. `None` marks a metric that could not be computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricScores {
    pub faithfulness: Option<f64>,
    pub answer_relevancy: Option<f64>,
    pub context_precision: Option<f64>,
}

impl MetricScores {
    pub fn get(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Faithfulness => self.faithfulness,
            MetricKind::AnswerRelevancy => self.answer_relevancy,
            MetricKind::ContextPrecision => self.context_precision,
        }
    }

    pub fn set(&mut self, kind: MetricKind, value: Option<f64>) {
        match kind {
            MetricKind::Faithfulness => self.faithfulness = value,
            MetricKind::AnswerRelevancy => self.answer_relevancy = value,
            MetricKind::ContextPrecision => self.context_precision = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSample {
    #[serde(flatten)]
    pub sample: EvaluationSample,
    pub scores: MetricScores,
}

/// Result of a whole evaluation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub samples: Vec<ScoredSample>,
    pub skipped_questions: Vec<String>,
}

impl EvaluationReport {
    /// Mean of a metric over the samples where it was computed.
    pub fn mean(&self, kind: MetricKind) -> Option<f64> {
        let values: Vec<f64> = self
            .samples
            .iter()
            .filter_map(|s| s.scores.get(kind))
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
