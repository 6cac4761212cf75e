mod tracing_setup;

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{Arc, OnceLock},
    time::Duration,
};

use anyhow::{Result, anyhow};
use clap::Parser;
use uuid::Uuid;

use ragprobe::{
    adapters::outbound::{
        backend::{BackendSettings, DEFAULT_BACKEND_URL, HttpRagBackend},
        llm::{ClientSettings, OpenAiCompatibleClient},
        report::CsvReportWriter,
        similarity::{EmbeddingSimilarity, LexicalSimilarity},
        templating::HandlebarsRenderer,
    },
    application::{
        EvaluationService, MetricSettings, MetricSuite, prompts::PromptTemplates,
    },
    cli::{API_KEY_ENV, BACKEND_URL_ENV, Cli, Commands, DatasetArgs, JudgeArgs, ProbeArgs, RunArgs},
    config::{DatasetConfig, validate_judge_settings},
    core::{
        ChatMessage, EvaluationReport, GenerationOptions, MetricKind, MultiSampleChat,
        SamplingPolicy,
        ports::{ChatModel, TextSimilarity},
    },
    paths::home_env_path,
};
use tracing_setup::LogOptions;

static ENV_FILES_ONCE: OnceLock<()> = OnceLock::new();

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let run_id = matches!(cli.command, Commands::Run(_)).then(new_run_id);
    let _guard = tracing_setup::init(
        LogOptions {
            verbose: cli.verbose,
            json: cli.log_json,
            pretty: cli.pretty,
        },
        run_id.as_deref(),
    );

    let outcome = match cli.command {
        Commands::Run(args) => run_command(args, run_id.as_deref()).await,
        Commands::Probe(args) => probe_command(args).await,
        Commands::Dataset(args) => dataset_command(args),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("Command failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_command(args: RunArgs, run_id: Option<&str>) -> Result<()> {
    let dataset = DatasetConfig::load_or_default(args.dataset.as_deref())?;
    validate_judge_settings(
        args.judge.max_tokens,
        args.judge.temperature,
        args.judge.strictness,
    )?;
    if let Some(id) = run_id {
        tracing::info!(run_id = id, cases = dataset.cases.len(), "Starting evaluation run");
    }

    ensure_env_files_loaded();
    let backend = HttpRagBackend::new(BackendSettings {
        url: resolve_backend_url(args.backend_url.clone()),
        chat_id: args.chat_id.clone().unwrap_or_else(|| dataset.chat_id.clone()),
        mode: args.mode.clone().or_else(|| dataset.mode.clone()),
        timeout: Duration::from_secs(args.backend_timeout_secs.max(1)),
    })?;

    let api_key = resolve_api_key(args.judge.api_key.clone())?;
    let chat = build_chat(&args.judge, &api_key)?;
    let metrics = MetricSuite::new(
        Arc::new(chat),
        Arc::new(HandlebarsRenderer::new()),
        build_similarity(&args.judge)?,
        PromptTemplates::with_overrides(&dataset.prompts),
        MetricSettings {
            strictness: args.judge.strictness,
            ..Default::default()
        },
    );
    let writer = CsvReportWriter::new(&args.output);
    let service = EvaluationService::new(Arc::new(backend), metrics, Arc::new(writer));

    let report = service.run(&dataset.cases).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    println!("Detailed results saved to '{}'", args.output.display());
    Ok(())
}

async fn probe_command(args: ProbeArgs) -> Result<()> {
    if args.samples == 0 {
        return Err(anyhow!("--samples must be >= 1"));
    }
    validate_judge_settings(args.judge.max_tokens, args.judge.temperature, 1)?;
    ensure_env_files_loaded();
    let api_key = resolve_api_key(args.judge.api_key.clone())?;
    let chat = build_chat(&args.judge, &api_key)?;

    println!(
        "[probe] requesting {} sample(s) from '{}'...",
        args.samples, args.judge.judge_model
    );
    let messages = [ChatMessage::user(args.prompt.clone())];
    let stop = (!args.stop.is_empty()).then_some(args.stop.as_slice());
    let result = chat
        .generate(
            &messages,
            stop,
            &GenerationOptions::default().with_samples(args.samples),
        )
        .await?;
    for (idx, generation) in result.generations.iter().enumerate() {
        println!(
            "--- Candidate {} (finish: {}) ---\n{}",
            idx + 1,
            generation.finish_reason.as_deref().unwrap_or("n/a"),
            generation.text
        );
    }
    Ok(())
}

fn dataset_command(args: DatasetArgs) -> Result<()> {
    let dataset = DatasetConfig::load_or_default(args.dataset.as_deref())?;
    print!("{}", dataset.to_yaml()?);
    Ok(())
}

fn build_chat(judge: &JudgeArgs, api_key: &str) -> Result<MultiSampleChat> {
    let client = OpenAiCompatibleClient::new(
        ClientSettings {
            provider: provider_label(&judge.judge_base_url),
            base_url: judge.judge_base_url.clone(),
            model: judge.judge_model.clone(),
            max_tokens: Some(judge.max_tokens),
            temperature: Some(judge.temperature),
            timeout: Duration::from_secs(judge.judge_timeout_secs.max(1)),
        },
        api_key,
    )?;
    let policy = match judge.parallel_samples {
        Some(max_in_flight) if max_in_flight > 1 => SamplingPolicy::Concurrent { max_in_flight },
        _ => SamplingPolicy::Sequential,
    };
    Ok(MultiSampleChat::new(Arc::new(client)).with_policy(policy))
}

fn build_similarity(judge: &JudgeArgs) -> Result<Arc<dyn TextSimilarity>> {
    match &judge.embeddings_url {
        Some(url) => {
            let key = normalize_value(std::env::var("EMBEDDINGS_API_KEY").ok());
            let similarity = EmbeddingSimilarity::new(
                url,
                judge.embeddings_model.clone(),
                key,
                Duration::from_secs(judge.judge_timeout_secs.max(1)),
            )?;
            Ok(Arc::new(similarity))
        }
        None => Ok(Arc::new(LexicalSimilarity::new())),
    }
}

fn provider_label(base_url: &str) -> String {
    if base_url.contains("groq.com") {
        "groq".into()
    } else if base_url.contains("openai.com") {
        "openai".into()
    } else {
        "openai-compatible".into()
    }
}

fn print_summary(report: &EvaluationReport) {
    println!("\n=== Evaluation Results ===");
    for kind in MetricKind::ALL {
        match report.mean(kind) {
            Some(mean) => println!("{:<20} {mean:.4}", kind.as_str()),
            None => println!("{:<20} n/a", kind.as_str()),
        }
    }
    println!("samples scored: {}", report.samples.len());
    if !report.skipped_questions.is_empty() {
        println!("questions skipped: {}", report.skipped_questions.len());
    }
}

fn resolve_api_key(cli_value: Option<String>) -> Result<String> {
    pick_value(cli_value, std::env::var(API_KEY_ENV).ok())
        .ok_or_else(|| anyhow!("Missing API key: pass --api-key or set {API_KEY_ENV}"))
}

fn resolve_backend_url(cli_value: Option<String>) -> String {
    pick_value(cli_value, std::env::var(BACKEND_URL_ENV).ok())
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
}

fn pick_value(cli_value: Option<String>, env_value: Option<String>) -> Option<String> {
    normalize_value(cli_value).or_else(|| normalize_value(env_value))
}

fn normalize_value(value: Option<String>) -> Option<String> {
    value
        .map(|candidate| candidate.trim().to_string())
        .filter(|candidate| !candidate.is_empty())
}

/// Loads `~/.env` (or `$RAGPROBE_HOME/.env`), then `./.env`. The first file
/// to set a variable wins and neither overrides variables already set.
fn ensure_env_files_loaded() {
    ENV_FILES_ONCE.get_or_init(|| {
        for path in env_file_candidates(home_env_path()) {
            load_env_file(&path);
        }
    });
}

fn env_file_candidates(home_env: Option<PathBuf>) -> Vec<PathBuf> {
    home_env
        .into_iter()
        .chain(std::iter::once(PathBuf::from(".env")))
        .collect()
}

fn load_env_file(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    tracing::debug!(path = %path.display(), "loading env file");
    apply_env_contents(&contents);
}

fn apply_env_contents(contents: &str) {
    for (key, value) in contents.lines().filter_map(parse_env_assignment) {
        if std::env::var_os(&key).is_none() {
            unsafe {
                std::env::set_var(&key, &value);
            }
        }
    }
}

fn parse_env_assignment(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value.trim()).to_string()))
}

fn unquote(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}
