use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

use crate::adapters::outbound::backend::DEFAULT_CHAT_ID;
use crate::application::prompts::PromptOverrides;
use crate::core::domain::TestCase;

/// Test questions plus the backend session they are asked in.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    #[serde(default = "default_chat_id")]
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "PromptOverrides::is_empty")]
    pub prompts: PromptOverrides,
}

fn default_chat_id() -> String {
    DEFAULT_CHAT_ID.to_string()
}

impl Default for DatasetConfig {
    /// Questions about the course backend this tool was first pointed at.
    fn default() -> Self {
        let case = |question: &str, ground_truth: &str| TestCase {
            question: question.into(),
            ground_truth: ground_truth.into(),
        };
        Self {
            chat_id: default_chat_id(),
            mode: None,
            cases: vec![
                case(
                    "What is the purpose of the IngestionService?",
                    "The IngestionService handles parsing documents (PDFs, etc.), splitting them into chunks, creating embeddings, and storing them in ChromaDB.",
                ),
                case(
                    "How does the ChatService retrieve information?",
                    "The ChatService uses an EmbeddingStoreContentRetriever to find relevant document chunks from ChromaDB based on vector similarity.",
                ),
                case(
                    "Which framework is used for RAG orchestration?",
                    "The application uses LangChain4j for RAG orchestration.",
                ),
            ],
            prompts: PromptOverrides::default(),
        }
    }
}

impl DatasetConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read dataset file at {}", path_ref.display()))?;
        let mut config = Self::from_yaml_str(&raw)
            .with_context(|| format!("Invalid dataset in {}", path_ref.display()))?;
        let base_dir = path_ref.parent().unwrap_or_else(|| Path::new("."));
        config
            .hydrate_prompts(base_dir)
            .with_context(|| format!("Failed to hydrate prompts for {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Unable to parse dataset YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// The dataset at `path`, or the built-in one when no path is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Unable to serialize dataset")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.cases.is_empty(),
            "Dataset must contain at least one case"
        );
        ensure!(
            !self.chat_id.trim().is_empty(),
            "Dataset chat_id must not be blank"
        );
        for (idx, case) in self.cases.iter().enumerate() {
            ensure!(
                !case.question.trim().is_empty(),
                "cases[{idx}] must define a question"
            );
            ensure!(
                !case.ground_truth.trim().is_empty(),
                "cases[{idx}] must define a ground_truth"
            );
        }
        Ok(())
    }

    fn hydrate_prompts(&mut self, base_dir: &Path) -> Result<()> {
        for (name, slot) in self.prompts.entries_mut() {
            if let Some(raw) = slot.as_mut() {
                *raw = resolve_prompt_template(raw, base_dir)
                    .with_context(|| format!("Prompt '{name}' could not be resolved"))?;
            }
        }
        Ok(())
    }
}

impl FromStr for DatasetConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_yaml_str(s)
    }
}

/// Judge generation limits, checked once before any request goes out.
pub fn validate_judge_settings(max_tokens: u32, temperature: f32, strictness: usize) -> Result<()> {
    ensure!(max_tokens > 0, "max_tokens must be > 0");
    ensure!(
        (0.0..=2.0).contains(&temperature),
        "temperature must be within [0, 2], got {temperature}"
    );
    ensure!(strictness > 0, "strictness must be > 0");
    Ok(())
}

/// Inline templates pass through; single-line values naming an existing file are read.
fn resolve_prompt_template(raw: &str, base_dir: &Path) -> Result<String> {
    if raw.contains('\n') {
        return Ok(raw.to_string());
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let candidate = Path::new(trimmed);
    let joined: PathBuf = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    };

    if joined.is_file() {
        return fs::read_to_string(&joined)
            .with_context(|| format!("Failed to read prompt template {}", joined.display()));
    }

    if looks_like_template_path(trimmed) {
        return Err(anyhow!(
            "Prompt template '{}' was not found relative to {}",
            trimmed,
            base_dir.display()
        ));
    }

    Ok(raw.to_string())
}

fn looks_like_template_path(value: &str) -> bool {
    value.contains('/')
        || value.contains('\\')
        || value.ends_with(".hbs")
        || value.ends_with(".handlebars")
        || value.ends_with(".tmpl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_dataset_from_str() {
        let yaml = r#"
        mode: WEB
        cases:
          - question: "What is X?"
            ground_truth: "X is a thing."
        "#;

        let config = DatasetConfig::from_yaml_str(yaml).expect("valid dataset");
        assert_eq!(config.chat_id, DEFAULT_CHAT_ID);
        assert_eq!(config.mode.as_deref(), Some("WEB"));
        assert_eq!(config.cases.len(), 1);
        assert!(config.prompts.is_empty());
    }

    #[test]
    fn default_dataset_is_valid() {
        let config = DatasetConfig::default();
        config.validate().expect("built-in dataset validates");
        assert_eq!(config.cases.len(), 3);
    }

    #[test]
    fn yaml_round_trip_keeps_default_dataset() {
        let yaml = DatasetConfig::default().to_yaml().unwrap();
        assert!(!yaml.contains("prompts"));
        let parsed: DatasetConfig = yaml.parse().unwrap();
        assert_eq!(parsed, DatasetConfig::default());
    }

    #[test]
    fn rejects_blank_ground_truth() {
        let yaml = r#"
        cases:
          - question: "What is X?"
            ground_truth: "  "
        "#;

        let err = DatasetConfig::from_yaml_str(yaml).unwrap_err();
        let messages: Vec<String> = err.chain().map(|cause| cause.to_string()).collect();
        assert!(
            messages.iter().any(|msg| msg.contains("ground_truth")),
            "error chain missing ground_truth context: {messages:?}"
        );
    }

    #[test]
    fn rejects_empty_cases() {
        let err = DatasetConfig::from_yaml_str("cases: []").unwrap_err();
        assert!(err.to_string().contains("at least one case"));
    }

    #[test]
    fn from_path_hydrates_prompt_files() {
        let temp = tempdir().unwrap();
        let prompts = temp.path().join("prompts");
        fs::create_dir(&prompts).unwrap();
        fs::write(prompts.join("question.hbs"), "Ask about {{answer}}").unwrap();

        let dataset_path = temp.path().join("dataset.yaml");
        fs::write(
            &dataset_path,
            r#"
cases:
  - question: "q"
    ground_truth: "g"
prompts:
  question_generation: "prompts/question.hbs"
  system: "Be terse."
"#,
        )
        .unwrap();

        let config = DatasetConfig::from_path(&dataset_path).expect("dataset loads");
        assert_eq!(
            config.prompts.question_generation.as_deref(),
            Some("Ask about {{answer}}")
        );
        assert_eq!(config.prompts.system.as_deref(), Some("Be terse."));
    }

    #[test]
    fn missing_prompt_file_is_an_error() {
        let temp = tempdir().unwrap();
        let dataset_path = temp.path().join("dataset.yaml");
        fs::write(
            &dataset_path,
            "cases:\n  - question: q\n    ground_truth: g\nprompts:\n  system: prompts/missing.hbs\n",
        )
        .unwrap();

        let err = DatasetConfig::from_path(&dataset_path).unwrap_err();
        let messages: Vec<String> = err.chain().map(|cause| cause.to_string()).collect();
        assert!(messages.iter().any(|msg| msg.contains("was not found")));
    }

    #[test]
    fn judge_settings_are_bounded() {
        assert!(validate_judge_settings(512, 0.0, 3).is_ok());
        assert!(validate_judge_settings(0, 0.0, 3).is_err());
        assert!(validate_judge_settings(512, 2.5, 3).is_err());
        assert!(validate_judge_settings(512, 0.0, 0).is_err());
    }
}
