//! In-process stand-ins for the RAG backend and the judge provider.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::post,
};
use serde_json::{Value, json};
use tokio::{net::TcpListener, task::JoinHandle};

/// Every request the fakes received, for assertions after the run.
#[derive(Debug, Default)]
pub struct Recorded {
    pub backend_queries: Vec<(HashMap<String, String>, String)>,
    pub judge_requests: Vec<Value>,
}

#[derive(Clone, Default)]
pub struct FakeState {
    pub recorded: Arc<Mutex<Recorded>>,
}

impl FakeState {
    pub fn judge_requests(&self) -> Vec<Value> {
        self.recorded.lock().unwrap().judge_requests.clone()
    }

    pub fn backend_queries(&self) -> Vec<(HashMap<String, String>, String)> {
        self.recorded.lock().unwrap().backend_queries.clone()
    }
}

pub struct FakeServer {
    pub addr: SocketAddr,
    pub state: FakeState,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub fn backend_url(&self) -> String {
        format!("http://{}/api/chat", self.addr)
    }

    pub fn judge_base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serves `/api/chat` and `/v1/chat/completions` on an ephemeral port.
/// Returns `None` when the sandbox forbids binding sockets.
pub async fn spawn_fakes() -> Result<Option<FakeServer>> {
    let listener = match TcpListener::bind(("127.0.0.1", 0)).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            eprintln!("skipping: cannot bind test listener: {e}");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let addr = listener.local_addr()?;
    let state = FakeState::default();
    let app = Router::new()
        .route("/api/chat", post(backend_chat))
        .route("/v1/chat/completions", post(judge_completion))
        .with_state(state.clone());

    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            eprintln!("fake server exited: {err:?}");
        }
    });

    Ok(Some(FakeServer {
        addr,
        state,
        handle,
    }))
}

async fn backend_chat(
    State(state): State<FakeState>,
    Query(params): Query<HashMap<String, String>>,
    question: String,
) -> Result<Json<Value>, StatusCode> {
    state
        .recorded
        .lock()
        .unwrap()
        .backend_queries
        .push((params, question.clone()));

    if question.contains("offline") {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({
        "answer": format!("Answer to: {question}"),
        "sources": [
            {"filename": "guide.pdf", "excerpt": "The ingestion pipeline splits documents into chunks.", "chunkIndex": 0},
            {"filename": "notes.md", "excerpt": "Unrelated release notes.", "chunkIndex": 7}
        ]
    })))
}

/// Answers by recognizing which judge prompt it was sent.
async fn judge_completion(State(state): State<FakeState>, Json(body): Json<Value>) -> Json<Value> {
    let prompt = body["messages"]
        .as_array()
        .and_then(|messages| messages.last())
        .and_then(|message| message["content"].as_str())
        .unwrap_or_default()
        .to_string();
    state
        .recorded
        .lock()
        .unwrap()
        .judge_requests
        .push(body.clone());

    let content = if prompt.contains("standalone factual statements") {
        json!({"statements": ["Chunks are created.", "Embeddings are stored."]}).to_string()
    } else if prompt.contains("can be directly inferred") {
        json!({"verdicts": [
            {"statement": "Chunks are created.", "reason": "stated", "verdict": 1},
            {"statement": "Embeddings are stored.", "reason": "absent", "verdict": 0}
        ]})
        .to_string()
    } else if prompt.contains("Write the question") {
        format!(
            "```json\n{}\n```",
            json!({"question": "What does the ingestion pipeline do?", "noncommittal": 0})
        )
    } else if prompt.contains("Unrelated release notes") {
        json!({"reason": "off topic", "verdict": 0}).to_string()
    } else if prompt.contains("Context chunk") {
        json!({"reason": "relevant", "verdict": 1}).to_string()
    } else {
        let seen = state.recorded.lock().unwrap().judge_requests.len();
        format!("candidate-{seen}")
    };

    Json(json!({
        "id": "chatcmpl-test",
        "model": body["model"].clone(),
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
}

/// The workspace manifest, so `cargo run` works from any working directory.
pub fn workspace_manifest() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("Cargo.toml")
}

/// `cargo run` of the ragprobe binary with a clean environment for its inputs.
pub fn ragprobe_command(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new("cargo");
    cmd.arg("run")
        .arg("--quiet")
        .arg("--manifest-path")
        .arg(workspace_manifest())
        .arg("-p")
        .arg("ragprobe")
        .arg("--bin")
        .arg("ragprobe")
        .arg("--")
        .current_dir(home)
        .env("RAGPROBE_HOME", home)
        .env_remove("GROQ_API_KEY")
        .env_remove("BACKEND_URL")
        .env_remove("RUST_LOG");
    cmd
}
