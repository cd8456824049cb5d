//! Mock OpenAI-compatible upstream for integration tests
//!
//! Answers every message in a request with its own choice, so batched and
//! single calls look alike. Can be told to fail the first N requests or to
//! reject prompts above a length with a context-overflow error.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Mock upstream with scripted failures
pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    /// Requests still to fail with 503 before answering
    fail_count: AtomicU32,
    /// Prompts longer than this many characters are rejected as too long
    overflow_above: Option<usize>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// One request as received by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub prompts: Vec<String>,
    pub provider: Option<Value>,
    pub authorization: Option<String>,
}

impl MockUpstream {
    /// Start a mock that answers every request
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(MockState::default()).await
    }

    /// Start a mock that fails the first `n` requests with 503
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_inner(MockState {
            fail_count: AtomicU32::new(n),
            ..MockState::default()
        })
        .await
    }

    /// Start a mock that rejects prompts longer than `chars` with 413
    pub async fn start_overflowing_above(chars: usize) -> anyhow::Result<Self> {
        Self::start_inner(MockState {
            overflow_above: Some(chars),
            ..MockState::default()
        })
        .await
    }

    async fn start_inner(state: MockState) -> anyhow::Result<Self> {
        let state = Arc::new(state);
        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL including `/v1`; the client appends `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Text the mock answers `prompt` with
pub fn reply_to(prompt: &str) -> String {
    format!("Reply: {prompt}")
}

#[derive(Debug, Deserialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(default)]
    provider: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

async fn handle_chat_completions(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    let prompts: Vec<String> = request.messages.into_iter().map(|m| m.content).collect();
    state
        .requests
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(RecordedRequest {
            model: request.model.clone(),
            prompts: prompts.clone(),
            provider: request.provider,
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        });

    let should_fail = state
        .fail_count
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if should_fail {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"message": "upstream overloaded"}})),
        )
            .into_response();
    }

    if let Some(limit) = state.overflow_above
        && prompts.iter().any(|p| p.len() > limit)
    {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({"error": {"message": "prompt is too long for this model", "code": "context_length_exceeded"}})),
        )
            .into_response();
    }

    let choices: Vec<Value> = prompts
        .iter()
        .enumerate()
        .map(|(index, prompt)| {
            json!({
                "index": index,
                "message": {"role": "assistant", "content": reply_to(prompt)},
                "finish_reason": "stop",
            })
        })
        .collect();

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": request.model,
        "choices": choices,
    }))
    .into_response()
}
