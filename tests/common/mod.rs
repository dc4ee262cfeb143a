//! Scriptable OpenAI-compatible backend for the engine tests. Serves the
//! catalog, load/unload and chat-completion endpoints on an ephemeral port
//! with controllable timing and failure behavior.
#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::{
    collections::HashSet,
    convert::Infallible,
    sync::{Arc, Mutex},
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct BackendBehavior {
    pub ttft: Duration,
    pub inter_token_delay: Duration,
    pub tokens_per_reply: usize,
    /// usage.completion_tokens reported on non-streaming replies
    pub completion_tokens: u64,
    /// never answer chat completions within any reasonable timeout
    pub hang: bool,
}

impl Default for BackendBehavior {
    fn default() -> Self {
        BackendBehavior {
            ttft: Duration::from_millis(50),
            inter_token_delay: Duration::from_millis(20),
            tokens_per_reply: 5,
            completion_tokens: 42,
            hang: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct BackendState {
    pub behavior: Mutex<BackendBehavior>,
    /// canonical ids the catalog refuses to report, making health probes fail
    pub unhealthy: Mutex<HashSet<String>>,
    /// model refs whose load requests are rejected
    pub fail_load: Mutex<HashSet<String>>,
    /// canonical ids of currently loaded models
    pub loaded: Mutex<Vec<String>>,
    /// every `model` field observed on a chat completion request
    pub inference_models: Mutex<Vec<String>>,
    pub load_calls: Mutex<u32>,
}

pub struct MockBackend {
    pub url: String,
    pub state: Arc<BackendState>,
}

/// The id the mock backend assigns at load time. Deliberately distinct from
/// both the alias and the submitted model id.
pub fn canonical_id(model_ref: &str) -> String {
    format!("{}:srv0", model_ref)
}

pub async fn spawn_backend() -> MockBackend {
    let state = Arc::new(BackendState::default());

    let app = Router::new()
        .route("/v1/models", get(catalog))
        .route("/v1/models/load", post(load))
        .route("/v1/models/unload", post(unload))
        .route("/v1/chat/completions", post(chat))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("mock backend should bind");
    let addr = listener.local_addr().expect("mock backend address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock backend serve");
    });

    MockBackend {
        url: format!("http://{}", addr),
        state,
    }
}

async fn catalog(State(state): State<Arc<BackendState>>) -> Json<Value> {
    let unhealthy = state.unhealthy.lock().unwrap().clone();
    let data: Vec<Value> = state
        .loaded
        .lock()
        .unwrap()
        .iter()
        .filter(|id| !unhealthy.contains(*id))
        .map(|id| json!({ "id": id, "object": "model" }))
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

async fn load(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<Value>,
) -> Response {
    *state.load_calls.lock().unwrap() += 1;

    let model_ref = body["model"].as_str().unwrap_or_default().to_string();
    if state.fail_load.lock().unwrap().contains(&model_ref) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model load refused").into_response();
    }

    let id = canonical_id(&model_ref);
    let mut loaded = state.loaded.lock().unwrap();
    if !loaded.contains(&id) {
        loaded.push(id.clone());
    }
    Json(json!({ "id": id, "object": "model" })).into_response()
}

async fn unload(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let model_ref = body["model"].as_str().unwrap_or_default();
    let id = canonical_id(model_ref);
    state
        .loaded
        .lock()
        .unwrap()
        .retain(|loaded| loaded != &id && loaded != model_ref);
    Json(json!({ "unloaded": model_ref }))
}

async fn chat(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<Value>,
) -> Response {
    let behavior = state.behavior.lock().unwrap().clone();
    state
        .inference_models
        .lock()
        .unwrap()
        .push(body["model"].as_str().unwrap_or_default().to_string());

    if behavior.hang {
        tokio::time::sleep(Duration::from_secs(600)).await;
        return (StatusCode::INTERNAL_SERVER_ERROR, "gave up").into_response();
    }

    if body["stream"].as_bool().unwrap_or(false) {
        return stream_response(behavior);
    }

    tokio::time::sleep(
        behavior.ttft + behavior.inter_token_delay * behavior.tokens_per_reply as u32,
    )
    .await;
    Json(json!({
        "id": "cmpl-mock",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "mock reply" },
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": 7,
            "completion_tokens": behavior.completion_tokens,
        },
    }))
    .into_response()
}

/// Emit `tokens_per_reply` content deltas paced by the configured TTFT and
/// inter-token delay, then the `[DONE]` sentinel.
fn stream_response(behavior: BackendBehavior) -> Response {
    let total = behavior.tokens_per_reply;
    let ttft = behavior.ttft;
    let delay = behavior.inter_token_delay;

    let stream = futures::stream::unfold(0usize, move |i| async move {
        if i > total {
            return None;
        }

        let chunk = if i == total {
            "data: [DONE]\n\n".to_string()
        } else {
            if i == 0 {
                tokio::time::sleep(ttft).await;
            } else {
                tokio::time::sleep(delay).await;
            }
            let payload = json!({
                "id": "cmpl-mock",
                "object": "chat.completion.chunk",
                "choices": [{ "index": 0, "delta": { "content": format!("tok{}", i) } }],
            });
            format!("data: {}\n\n", payload)
        };

        Some((Ok::<Bytes, Infallible>(Bytes::from(chunk)), i + 1))
    });

    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(stream))
        .expect("stream response builds")
}
