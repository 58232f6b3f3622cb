// src/test_utils/mock_llm_server.rs
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::{routing::post, Json, Router};
use serde_json::Value;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub api_key: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockServerState {
    responses: Arc<Mutex<VecDeque<Value>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn chat_completions_handler(
    State(state): State<MockServerState>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().unwrap().push(RecordedRequest {
        path: uri.path().to_string(),
        api_key: header("api-key"),
        authorization: header("authorization"),
        body,
    });

    match state.responses.lock().unwrap().pop_front() {
        Some(resp) => Ok(Json(resp)),
        None => {
            log::error!("Mock LLM server ran out of responses!");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// In-process chat-completions endpoint serving scripted raw responses.
pub struct MockLLMServer {
    addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    pub recorded_requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockLLMServer {
    pub async fn start(responses: Vec<Value>) -> Self {
        let state = MockServerState {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let recorded_requests = state.requests.clone();

        let app = Router::new()
            .route("/chat/completions", post(chat_completions_handler))
            .route(
                "/openai/deployments/{model}/chat/completions",
                post(chat_completions_handler),
            )
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("Failed to bind mock server to 127.0.0.1:0: {}", e));
        let addr = listener.local_addr().unwrap();
        log::info!("Mock LLM server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap_or_else(|e| log::error!("Mock LLM server error: {}", e));
        });

        MockLLMServer {
            addr,
            shutdown_tx,
            recorded_requests,
        }
    }

    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).is_err() {
            log::warn!("Mock LLM server shutdown signal already sent or receiver dropped.");
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
