#![allow(dead_code)] // each test binary uses a different slice of the helpers

//! In-process mock ComfyUI server for integration tests.
//!
//! Serves the four HTTP endpoints the client consumes (`/queue`,
//! `/prompt`, `/history/{id}`, `/view`) plus the `/ws` stream, all
//! backed by scriptable shared state. Each WebSocket connection plays
//! the next script from the queue, then idles until the peer goes away,
//! which lets tests model disconnects and reconnects precisely.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use comfykit_client::SessionConfig;

/// Install the test tracing subscriber; `RUST_LOG` controls verbosity.
/// Later calls within the same test binary are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One step of a scripted WebSocket connection.
pub enum WsAction {
    /// Send a text frame.
    Text(String),
    /// Send a binary frame.
    Binary(Vec<u8>),
    /// Pause before the next step.
    Sleep(Duration),
    /// Drop the connection.
    Close,
}

/// Shared, scriptable server state.
pub struct MockState {
    /// Response body for `GET /queue`.
    pub queue: Mutex<Value>,
    /// Response body for `POST /prompt`.
    pub ticket: Mutex<Value>,
    /// Status code for `POST /prompt` (the server reports validation
    /// rejections as 400 with a parseable body).
    pub ticket_status: Mutex<u16>,
    /// Response body for `GET /history/{id}`.
    pub history: Mutex<Value>,
    /// Artifact bytes served by `GET /view`, keyed by filename.
    pub artifacts: Mutex<HashMap<String, Vec<u8>>>,
    /// One script per expected WebSocket connection, in order.
    pub scripts: Mutex<VecDeque<Vec<WsAction>>>,
    /// Number of `POST /prompt` calls received.
    pub submissions: AtomicUsize,
    /// Number of WebSocket connections accepted.
    pub ws_connections: AtomicUsize,
    /// Prompt IDs received via `POST /queue` delete requests.
    pub cancelled: Mutex<Vec<String>>,
    /// Number of `POST /interrupt` calls received.
    pub interrupts: AtomicUsize,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(json!({"queue_running": [], "queue_pending": []})),
            ticket: Mutex::new(json!({"prompt_id": "unset", "number": 1, "node_errors": {}})),
            ticket_status: Mutex::new(200),
            history: Mutex::new(json!({})),
            artifacts: Mutex::new(HashMap::new()),
            scripts: Mutex::new(VecDeque::new()),
            submissions: AtomicUsize::new(0),
            ws_connections: AtomicUsize::new(0),
            cancelled: Mutex::new(Vec::new()),
            interrupts: AtomicUsize::new(0),
        })
    }
}

/// A running mock server.
pub struct MockComfy {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockComfy {
    /// Session config pointing at this server, with a short receive
    /// timeout so tests never stall for long.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            api_url: format!("http://{}", self.addr),
            ws_url: format!("ws://{}", self.addr),
            client_id: Some("test-client".to_string()),
            recv_timeout: Duration::from_millis(500),
        }
    }
}

/// Bind an ephemeral port and serve the mock in a background task.
pub async fn spawn(state: Arc<MockState>) -> MockComfy {
    init_tracing();

    let app = Router::new()
        .route("/queue", get(get_queue).post(post_queue))
        .route("/prompt", post(post_prompt))
        .route("/interrupt", post(post_interrupt))
        .route("/history/{prompt_id}", get(get_history))
        .route("/view", get(get_view))
        .route("/ws", get(ws_upgrade))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock");
    });

    MockComfy { addr, state }
}

/// Build a scripted `{"type": ..., "data": ...}` text frame.
pub fn msg(kind: &str, data: Value) -> WsAction {
    WsAction::Text(json!({"type": kind, "data": data}).to_string())
}

/// Shorthand for the `executing` messages that drive the state machine.
pub fn executing(prompt_id: &str, node: Option<&str>) -> WsAction {
    msg("executing", json!({"node": node, "prompt_id": prompt_id}))
}

/// A minimal two-node workflow payload.
pub fn sample_workflow() -> Value {
    json!({
        "3": {"class_type": "KSampler", "inputs": {"seed": 42, "steps": 20}},
        "9": {"class_type": "SaveImage", "inputs": {"images": ["3", 0]}}
    })
}

// ---- handlers ----

async fn get_queue(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(state.queue.lock().unwrap().clone())
}

async fn post_prompt(State(state): State<Arc<MockState>>) -> Response {
    state.submissions.fetch_add(1, Ordering::SeqCst);
    let status = StatusCode::from_u16(*state.ticket_status.lock().unwrap())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = state.ticket.lock().unwrap().clone();
    (status, Json(body)).into_response()
}

async fn post_queue(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> StatusCode {
    if let Some(deleted) = body.get("delete").and_then(Value::as_array) {
        let mut cancelled = state.cancelled.lock().unwrap();
        for id in deleted {
            if let Some(id) = id.as_str() {
                cancelled.push(id.to_string());
            }
        }
    }
    StatusCode::OK
}

async fn post_interrupt(State(state): State<Arc<MockState>>) -> StatusCode {
    state.interrupts.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn get_history(
    State(state): State<Arc<MockState>>,
    Path(_prompt_id): Path<String>,
) -> Json<Value> {
    Json(state.history.lock().unwrap().clone())
}

async fn get_view(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filename = params.get("filename").cloned().unwrap_or_default();
    match state.artifacts.lock().unwrap().get(&filename) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn ws_upgrade(State(state): State<Arc<MockState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

async fn run_ws(mut socket: WebSocket, state: Arc<MockState>) {
    state.ws_connections.fetch_add(1, Ordering::SeqCst);
    let script = state
        .scripts
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_default();

    for action in script {
        match action {
            WsAction::Text(text) => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            WsAction::Binary(bytes) => {
                if socket.send(Message::Binary(bytes.into())).await.is_err() {
                    return;
                }
            }
            WsAction::Sleep(duration) => tokio::time::sleep(duration).await,
            WsAction::Close => return,
        }
    }

    // Script exhausted: hold the connection open until the peer leaves.
    while let Some(Ok(_)) = socket.recv().await {}
}
