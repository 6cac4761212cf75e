use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::adapters::outbound::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::application::metrics::DEFAULT_STRICTNESS;

/// Environment variable holding the judge API key.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";
/// Environment variable holding the backend chat endpoint.
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

/// Ragprobe CLI definition.
#[derive(Debug, Parser)]
#[command(name = "ragprobe")]
#[command(about = "Score a RAG chat backend with an LLM judge", version)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Verbose logging with timestamps")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub log_json: bool,

    #[arg(
        long,
        global = true,
        requires = "log_json",
        help = "Pretty-print JSON logs"
    )]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Query the backend for every test case, score the answers and write a CSV report.
    Run(RunArgs),
    /// Send one prompt to the judge model and print every sampled candidate.
    Probe(ProbeArgs),
    /// Print the effective dataset as YAML.
    Dataset(DatasetArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[arg(long, help = "YAML dataset file (defaults to the built-in questions)")]
    pub dataset: Option<PathBuf>,

    #[arg(long, help = "Backend chat endpoint (can also come from BACKEND_URL)")]
    pub backend_url: Option<String>,

    #[arg(long, help = "Override the dataset's chat session id")]
    pub chat_id: Option<String>,

    #[arg(long, help = "Retrieval mode passed to the backend (e.g. LOCAL, WEB)")]
    pub mode: Option<String>,

    #[arg(long, default_value_t = 120, help = "Backend request timeout in seconds")]
    pub backend_timeout_secs: u64,

    #[arg(
        long,
        default_value = "results.csv",
        help = "Where to write the per-sample CSV report"
    )]
    pub output: PathBuf,

    #[arg(long, help = "Print the report as JSON instead of a summary table")]
    pub json: bool,

    #[command(flatten)]
    pub judge: JudgeArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ProbeArgs {
    #[arg(long, help = "Prompt sent as the user message")]
    pub prompt: String,

    #[arg(long, default_value_t = 1, help = "Number of candidates to request")]
    pub samples: usize,

    #[arg(long = "stop", help = "Stop sequence (repeatable)")]
    pub stop: Vec<String>,

    #[command(flatten)]
    pub judge: JudgeArgs,
}

#[derive(Debug, Args, Clone, Default)]
pub struct DatasetArgs {
    #[arg(long, help = "YAML dataset file (defaults to the built-in questions)")]
    pub dataset: Option<PathBuf>,
}

/// Settings for the judge model and the similarity backend.
#[derive(Debug, Args, Clone)]
pub struct JudgeArgs {
    #[arg(long, help = "Judge API key (can also come from GROQ_API_KEY)")]
    pub api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_MODEL, help = "Judge model identifier")]
    pub judge_model: String,

    #[arg(
        long,
        default_value = DEFAULT_BASE_URL,
        help = "OpenAI-compatible base URL of the judge provider"
    )]
    pub judge_base_url: String,

    #[arg(long, default_value_t = 512, help = "Token limit per judge completion")]
    pub max_tokens: u32,

    #[arg(long, default_value_t = 0.0, help = "Judge sampling temperature")]
    pub temperature: f32,

    #[arg(
        long,
        default_value_t = DEFAULT_STRICTNESS,
        help = "Questions generated per answer for relevancy scoring"
    )]
    pub strictness: usize,

    #[arg(
        long,
        help = "Issue multi-sample judge calls concurrently, at most this many at once"
    )]
    pub parallel_samples: Option<usize>,

    #[arg(long, default_value_t = 120, help = "Judge request timeout in seconds")]
    pub judge_timeout_secs: u64,

    #[arg(
        long,
        help = "OpenAI-compatible base URL for embeddings (lexical similarity when unset)"
    )]
    pub embeddings_url: Option<String>,

    #[arg(
        long,
        default_value = "all-MiniLM-L6-v2",
        help = "Embedding model identifier"
    )]
    pub embeddings_model: String,
}
