//! LLM-judged RAG metrics: faithfulness, answer relevancy and context precision.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::application::judge::{parse_judge_json, preview, verdict_value};
use crate::application::prompts::PromptTemplates;
use crate::core::domain::{
    ChatMessage, EvaluationSample, GenerationOptions, GenerationResult, MetricKind, MetricScores,
};
use crate::core::error::{Error, Result};
use crate::core::ports::{ChatModel, PromptRenderer, TextSimilarity};

/// Number of questions generated back from an answer when scoring relevancy.
pub const DEFAULT_STRICTNESS: usize = 3;

#[derive(Debug, Clone)]
pub struct MetricSettings {
    pub strictness: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for MetricSettings {
    fn default() -> Self {
        Self {
            strictness: DEFAULT_STRICTNESS,
            max_tokens: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatementsReply {
    #[serde(default)]
    statements: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VerdictsReply {
    #[serde(default)]
    verdicts: Vec<VerdictEntry>,
}

#[derive(Debug, Deserialize)]
struct VerdictEntry {
    #[serde(default)]
    verdict: Value,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    #[serde(default)]
    question: String,
    #[serde(default)]
    noncommittal: Value,
}

/// Scores samples by prompting a judge model through a [`ChatModel`].
#[derive(Clone)]
pub struct MetricSuite {
    chat: Arc<dyn ChatModel>,
    renderer: Arc<dyn PromptRenderer>,
    similarity: Arc<dyn TextSimilarity>,
    templates: PromptTemplates,
    settings: MetricSettings,
}

impl MetricSuite {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        renderer: Arc<dyn PromptRenderer>,
        similarity: Arc<dyn TextSimilarity>,
        templates: PromptTemplates,
        settings: MetricSettings,
    ) -> Self {
        Self {
            chat,
            renderer,
            similarity,
            templates,
            settings,
        }
    }

    /// Compute every metric. A metric that fails is logged and left empty.
    pub async fn score(&self, sample: &EvaluationSample) -> MetricScores {
        let mut scores = MetricScores::default();
        for kind in MetricKind::ALL {
            let outcome = match kind {
                MetricKind::Faithfulness => self.faithfulness(sample).await,
                MetricKind::AnswerRelevancy => self.answer_relevancy(sample).await,
                MetricKind::ContextPrecision => self.context_precision(sample).await,
            };
            match outcome {
                Ok(value) => {
                    debug!(metric = kind.as_str(), score = ?value, "metric computed");
                    scores.set(kind, value);
                }
                Err(err) => {
                    warn!(
                        metric = kind.as_str(),
                        question = %preview(&sample.question, 60),
                        retryable = err.is_retryable(),
                        error = %err,
                        "metric failed; leaving it empty"
                    );
                    scores.set(kind, None);
                }
            }
        }
        scores
    }

    /// Share of the answer's statements that the retrieved context supports.
    pub async fn faithfulness(&self, sample: &EvaluationSample) -> Result<Option<f64>> {
        let prompt = self.render(
            &self.templates.statement_extraction,
            &json!({"question": sample.question, "answer": sample.answer}),
        )?;
        let reply = self.ask(&prompt, 1).await?;
        let statements: Vec<String> = parse_judge_json::<StatementsReply>(first_text(&reply)?)?
            .statements
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if statements.is_empty() {
            return Ok(None);
        }

        let prompt = self.render(
            &self.templates.statement_verdicts,
            &json!({
                "context": sample.contexts.join("\n\n"),
                "statements": statements,
            }),
        )?;
        let reply = self.ask(&prompt, 1).await?;
        let verdicts = parse_judge_json::<VerdictsReply>(first_text(&reply)?)?
            .verdicts
            .iter()
            .map(|entry| verdict_value(&entry.verdict).unwrap_or(false))
            .collect::<Vec<_>>();
        Ok(faithfulness_score(&verdicts))
    }

    /// How well questions generated back from the answer match the real question.
    ///
    /// Requests `strictness` candidates in one call; any noncommittal
    /// candidate zeroes the score.
    pub async fn answer_relevancy(&self, sample: &EvaluationSample) -> Result<Option<f64>> {
        let prompt = self.render(
            &self.templates.question_generation,
            &json!({"answer": sample.answer, "context": sample.contexts.join("\n\n")}),
        )?;
        let reply = self.ask(&prompt, self.settings.strictness.max(1)).await?;

        let mut questions = Vec::with_capacity(reply.len());
        let mut noncommittal = false;
        for text in reply.texts() {
            let generated: GeneratedQuestion = parse_judge_json(text)?;
            noncommittal |= verdict_value(&generated.noncommittal).unwrap_or(false);
            questions.push(generated.question.trim().to_string());
        }
        if questions.iter().all(String::is_empty) {
            return Ok(Some(0.0));
        }

        let similarities = self
            .similarity
            .similarities(&sample.question, &questions)
            .await?;
        Ok(Some(relevancy_score(&similarities, noncommittal)))
    }

    /// Average precision of the retrieved chunks, judged against the reference answer.
    pub async fn context_precision(&self, sample: &EvaluationSample) -> Result<Option<f64>> {
        if sample.contexts.is_empty() {
            return Ok(None);
        }

        let mut verdicts = Vec::with_capacity(sample.contexts.len());
        for context in &sample.contexts {
            let prompt = self.render(
                &self.templates.context_usefulness,
                &json!({
                    "question": sample.question,
                    "ground_truth": sample.ground_truth,
                    "context": context,
                }),
            )?;
            let reply = self.ask(&prompt, 1).await?;
            let entry: VerdictEntry = parse_judge_json(first_text(&reply)?)?;
            verdicts.push(verdict_value(&entry.verdict).unwrap_or(false));
        }
        Ok(Some(average_precision(&verdicts)))
    }

    fn render(&self, template: &str, data: &Value) -> Result<String> {
        self.renderer.render(template, data)
    }

    async fn ask(&self, prompt: &str, n: usize) -> Result<GenerationResult> {
        let messages = [
            ChatMessage::system(self.templates.system.clone()),
            ChatMessage::user(prompt),
        ];
        let options = GenerationOptions {
            n,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        self.chat.generate(&messages, None, &options).await
    }
}

fn first_text(result: &GenerationResult) -> Result<&str> {
    result
        .first_text()
        .ok_or_else(|| Error::MalformedResponse("judge returned no generations".into()))
}

/// Supported statements over all judged statements; `None` when nothing was judged.
pub fn faithfulness_score(verdicts: &[bool]) -> Option<f64> {
    if verdicts.is_empty() {
        return None;
    }
    let supported = verdicts.iter().filter(|v| **v).count();
    Some(supported as f64 / verdicts.len() as f64)
}

/// Mean similarity, forced to zero when the answer was noncommittal.
pub fn relevancy_score(similarities: &[f64], noncommittal: bool) -> f64 {
    if noncommittal || similarities.is_empty() {
        return 0.0;
    }
    similarities.iter().sum::<f64>() / similarities.len() as f64
}

/// `sum_k(precision@k * v_k) / (relevant + 1e-10)` over chunks in retrieval order.
pub fn average_precision(verdicts: &[bool]) -> f64 {
    let relevant = verdicts.iter().filter(|v| **v).count() as f64;
    let mut hits = 0.0;
    let mut numerator = 0.0;
    for (idx, useful) in verdicts.iter().enumerate() {
        if *useful {
            hits += 1.0;
            numerator += hits / (idx + 1) as f64;
        }
    }
    numerator / (relevant + 1e-10)
}
