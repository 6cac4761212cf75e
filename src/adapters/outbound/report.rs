use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::domain::{EvaluationReport, ScoredSample};
use crate::core::error::{Error as CoreError, Result};
use crate::core::ports::ReportWriter;

/// One CSV row; `contexts` is stored as a JSON array string.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    question: &'a str,
    answer: &'a str,
    contexts: String,
    ground_truth: &'a str,
    faithfulness: Option<f64>,
    answer_relevancy: Option<f64>,
    context_precision: Option<f64>,
}

impl<'a> CsvRow<'a> {
    fn from_sample(scored: &'a ScoredSample) -> Result<Self> {
        let contexts = serde_json::to_string(&scored.sample.contexts)
            .map_err(|e| CoreError::Report(format!("Failed to encode contexts: {e}")))?;
        Ok(Self {
            question: &scored.sample.question,
            answer: &scored.sample.answer,
            contexts,
            ground_truth: &scored.sample.ground_truth,
            faithfulness: finite(scored.scores.faithfulness),
            answer_relevancy: finite(scored.scores.answer_relevancy),
            context_precision: finite(scored.scores.context_precision),
        })
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Writes one row per scored sample to a CSV file.
#[derive(Debug, Clone)]
pub struct CsvReportWriter {
    path: PathBuf,
}

impl CsvReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportWriter for CsvReportWriter {
    fn write(&self, report: &EvaluationReport) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Report(format!("{}: {e}", parent.display())))?;
        }
        let file = std::fs::File::create(&self.path)
            .map_err(|e| CoreError::Report(format!("{}: {e}", self.path.display())))?;
        write_csv(file, report)
    }
}

pub fn write_csv<W: std::io::Write>(writer: W, report: &EvaluationReport) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for scored in &report.samples {
        csv_writer
            .serialize(CsvRow::from_sample(scored)?)
            .map_err(|e| CoreError::Report(e.to_string()))?;
    }
    if report.samples.is_empty() {
        csv_writer
            .write_record([
                "question",
                "answer",
                "contexts",
                "ground_truth",
                "faithfulness",
                "answer_relevancy",
                "context_precision",
            ])
            .map_err(|e| CoreError::Report(e.to_string()))?;
    }
    csv_writer
        .flush()
        .map_err(|e| CoreError::Report(e.to_string()))
}
