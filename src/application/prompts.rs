//! Default judge prompt templates (handlebars). Each can be replaced from the
//! dataset file's `prompts` section.

use serde::{Deserialize, Serialize};

pub const JUDGE_SYSTEM: &str = "You are a strict evaluator of question answering systems. \
Reply with a single JSON object and nothing else.";

pub const STATEMENT_EXTRACTION: &str = r#"Break the answer below into standalone factual statements.
Each statement must be understandable without the question, use no pronouns, and carry one claim.

Question: {{question}}
Answer: {{answer}}

Respond in JSON:
{"statements": ["<statement>", "..."]}"#;

pub const STATEMENT_VERDICTS: &str = r#"Judge whether each statement can be directly inferred from the context.
Give verdict 1 if it can, 0 if it cannot.

Context:
{{context}}

Statements:
{{#each statements}}{{@index}}. {{this}}
{{/each}}
Respond in JSON, one entry per statement in the same order:
{"verdicts": [{"statement": "<statement>", "reason": "<short reason>", "verdict": 0}]}"#;

pub const QUESTION_GENERATION: &str = r#"Write the question that the answer below is responding to.
Also say whether the answer is noncommittal: 1 if it is evasive, vague or says it does not know, 0 otherwise.

Answer: {{answer}}

Respond in JSON:
{"question": "<question>", "noncommittal": 0}"#;

pub const CONTEXT_USEFULNESS: &str = r#"Given a question, its reference answer and one retrieved context chunk,
decide whether the chunk was useful in arriving at the reference answer.
Give verdict 1 if it was useful, 0 if it was not.

Question: {{question}}
Reference answer: {{ground_truth}}
Context chunk: {{context}}

Respond in JSON:
{"reason": "<short reason>", "verdict": 0}"#;

/// The full set of judge prompts used by the metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub system: String,
    pub statement_extraction: String,
    pub statement_verdicts: String,
    pub question_generation: String,
    pub context_usefulness: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system: JUDGE_SYSTEM.into(),
            statement_extraction: STATEMENT_EXTRACTION.into(),
            statement_verdicts: STATEMENT_VERDICTS.into(),
            question_generation: QUESTION_GENERATION.into(),
            context_usefulness: CONTEXT_USEFULNESS.into(),
        }
    }
}

/// Optional per-prompt replacements as read from configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PromptOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_extraction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_verdicts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_usefulness: Option<String>,
}

impl PromptOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub(crate) fn entries_mut(&mut self) -> [(&'static str, &mut Option<String>); 5] {
        [
            ("system", &mut self.system),
            ("statement_extraction", &mut self.statement_extraction),
            ("statement_verdicts", &mut self.statement_verdicts),
            ("question_generation", &mut self.question_generation),
            ("context_usefulness", &mut self.context_usefulness),
        ]
    }
}

impl PromptTemplates {
    pub fn with_overrides(overrides: &PromptOverrides) -> Self {
        let defaults = Self::default();
        let pick = |value: &Option<String>, fallback: String| value.clone().unwrap_or(fallback);
        Self {
            system: pick(&overrides.system, defaults.system),
            statement_extraction: pick(
                &overrides.statement_extraction,
                defaults.statement_extraction,
            ),
            statement_verdicts: pick(&overrides.statement_verdicts, defaults.statement_verdicts),
            question_generation: pick(
                &overrides.question_generation,
                defaults.question_generation,
            ),
            context_usefulness: pick(&overrides.context_usefulness, defaults.context_usefulness),
        }
    }
}
