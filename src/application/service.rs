//! Drives one evaluation run: query the backend for every test case, score
//! the collected samples, then hand the report to the writer.

use std::sync::Arc;

use tracing::{Instrument, error, info, info_span};

use crate::application::judge::preview;
use crate::application::metrics::MetricSuite;
use crate::core::domain::{EvaluationReport, EvaluationSample, ScoredSample, TestCase};
use crate::core::error::{Error, Result};
use crate::core::ports::{RagBackend, ReportWriter};

pub struct EvaluationService {
    backend: Arc<dyn RagBackend>,
    metrics: MetricSuite,
    writer: Arc<dyn ReportWriter>,
}

impl EvaluationService {
    pub fn new(
        backend: Arc<dyn RagBackend>,
        metrics: MetricSuite,
        writer: Arc<dyn ReportWriter>,
    ) -> Self {
        Self {
            backend,
            metrics,
            writer,
        }
    }

    pub async fn run(&self, cases: &[TestCase]) -> Result<EvaluationReport> {
        info!("Starting evaluation with {} sample questions", cases.len());
        let (samples, skipped_questions) = self.collect(cases).await;
        if samples.is_empty() {
            return Err(Error::Backend {
                url: "<all>".into(),
                details: "No samples were collected; check that the backend is running".into(),
            });
        }

        info!(samples = samples.len(), "Scoring collected samples");
        let mut scored = Vec::with_capacity(samples.len());
        for (idx, sample) in samples.into_iter().enumerate() {
            let span = info_span!("score", sample = idx + 1);
            let scores = self.metrics.score(&sample).instrument(span).await;
            scored.push(ScoredSample { sample, scores });
        }

        let report = EvaluationReport {
            samples: scored,
            skipped_questions,
        };
        self.writer.write(&report)?;
        Ok(report)
    }

    /// Ask the backend every question; failures are logged and skipped.
    pub async fn collect(&self, cases: &[TestCase]) -> (Vec<EvaluationSample>, Vec<String>) {
        let mut samples = Vec::with_capacity(cases.len());
        let mut skipped = Vec::new();
        for case in cases {
            info!(question = %case.question, "Processing question");
            match self.backend.ask(&case.question).await {
                Ok(answer) => {
                    let sample = EvaluationSample::from_answer(case, answer);
                    info!(
                        answer = %preview(&sample.answer, 100),
                        contexts = sample.contexts.len(),
                        "Retrieved answer"
                    );
                    samples.push(sample);
                }
                Err(err) => {
                    error!(question = %case.question, error = %err, "Error querying backend");
                    skipped.push(case.question.clone());
                }
            }
        }
        (samples, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::similarity::LexicalSimilarity;
    use crate::adapters::outbound::templating::HandlebarsRenderer;
    use crate::application::metrics::MetricSettings;
    use crate::application::prompts::PromptTemplates;
    use crate::core::domain::{
        BackendAnswer, ChatMessage, Generation, GenerationOptions, GenerationResult,
        SourceDocument,
    };
    use crate::core::ports::ChatModel;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeBackend;

    #[async_trait]
    impl RagBackend for FakeBackend {
        async fn ask(&self, question: &str) -> Result<BackendAnswer> {
            if question.contains("offline") {
                return Err(Error::Backend {
                    url: "http://fake".into(),
                    details: "connection refused".into(),
                });
            }
            Ok(BackendAnswer {
                answer: format!("Answer to {question}"),
                sources: vec![SourceDocument {
                    filename: "doc.pdf".into(),
                    excerpt: "relevant chunk".into(),
                    chunk_index: 0,
                }],
            })
        }
    }

    /// Replies with a JSON object that satisfies every judge prompt.
    struct AgreeableJudge;

    #[async_trait]
    impl ChatModel for AgreeableJudge {
        async fn generate(
            &self,
            messages: &[ChatMessage],
            _stop: Option<&[String]>,
            options: &GenerationOptions,
        ) -> Result<GenerationResult> {
            let prompt = &messages.last().unwrap().content;
            let text = if prompt.contains("standalone factual statements") {
                r#"{"statements": ["A statement."]}"#.to_string()
            } else if prompt.contains("Write the question") {
                r#"{"question": "same question", "noncommittal": 0}"#.to_string()
            } else {
                r#"{"verdicts": [{"verdict": 1}], "verdict": 1}"#.to_string()
            };
            Ok(GenerationResult::new(
                (0..options.n).map(|_| Generation::from_text(text.clone())).collect(),
            ))
        }
    }

    #[derive(Default)]
    struct MemoryWriter {
        written: Mutex<Option<EvaluationReport>>,
    }

    impl ReportWriter for MemoryWriter {
        fn write(&self, report: &EvaluationReport) -> Result<()> {
            *self.written.lock().unwrap() = Some(report.clone());
            Ok(())
        }
    }

    fn service(writer: Arc<MemoryWriter>) -> EvaluationService {
        let metrics = MetricSuite::new(
            Arc::new(AgreeableJudge),
            Arc::new(HandlebarsRenderer::new()),
            Arc::new(LexicalSimilarity::new()),
            PromptTemplates::default(),
            MetricSettings::default(),
        );
        EvaluationService::new(Arc::new(FakeBackend), metrics, writer)
    }

    fn case(question: &str) -> TestCase {
        TestCase {
            question: question.into(),
            ground_truth: "reference".into(),
        }
    }

    #[tokio::test]
    async fn skips_failed_questions_and_scores_the_rest() {
        let writer = Arc::new(MemoryWriter::default());
        let report = service(writer.clone())
            .run(&[case("same question"), case("offline question")])
            .await
            .unwrap();

        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.skipped_questions, vec!["offline question".to_string()]);
        let scores = report.samples[0].scores;
        assert_eq!(scores.faithfulness, Some(1.0));
        assert!((scores.answer_relevancy.unwrap() - 1.0).abs() < 1e-9);
        assert!((scores.context_precision.unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(writer.written.lock().unwrap().as_ref(), Some(&report));
    }

    #[tokio::test]
    async fn fails_when_nothing_was_collected() {
        let writer = Arc::new(MemoryWriter::default());
        let err = service(writer.clone())
            .run(&[case("offline one"), case("offline two")])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("No samples were collected"));
        assert!(writer.written.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn collect_keeps_contexts_from_sources() {
        let writer = Arc::new(MemoryWriter::default());
        let (samples, skipped) = service(writer).collect(&[case("what?")]).await;
        assert!(skipped.is_empty());
        assert_eq!(samples[0].contexts, vec!["relevant chunk".to_string()]);
        assert_eq!(samples[0].ground_truth, "reference");
    }
}
