//! HTTP surface of the ModelOps gateway.
//!
//! Exposes the conversation orchestrator over two endpoints: a request/response
//! chat call and a Server-Sent Events variant that reports each tool call and
//! tool result as it happens before the final answer.

pub mod backend;
pub mod error;
pub mod sse;

pub use backend::ChatBackend;
pub use error::{Result, ServerError};
pub use sse::{SseEvent, SseStream};

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json as AxumJson, State};
use axum::http::{HeaderValue, Method, Request};
use axum::middleware::Next;
use axum::response::{Json, Response};
use axum::routing::{get, post};
use axum::{middleware, Router};
use modelops_core::{Message, Role, ServerSettings};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;

const KEEPALIVE_TEXT: &str = "keep-alive";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Body of both chat endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub role: Role,
    pub content: String,
}

impl From<Message> for ChatReply {
    fn from(message: Message) -> Self {
        Self {
            content: message.text().to_string(),
            role: message.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatReply,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
    /// Browser origins allowed to call the API with credentials. Empty allows any
    /// origin without credentials.
    pub cors_origins: Vec<String>,
    pub enable_logging: bool,
    pub sse_keepalive_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            enable_cors: true,
            cors_origins: vec!["http://localhost:5173".to_string()],
            enable_logging: true,
            sse_keepalive_interval: Duration::from_secs(15),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `server` section of the gateway configuration.
    pub fn from_settings(settings: &ServerSettings) -> Result<Self> {
        Ok(Self::new()
            .with_bind_addr_str(&settings.bind_addr)?
            .with_cors_origins(settings.cors_origins.clone())
            .with_logging(settings.enable_logging)
            .with_sse_keepalive(Duration::from_secs(settings.sse_keepalive_secs.max(1))))
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr.parse().map_err(|e| {
            ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e))
        })?;
        Ok(self)
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    pub fn with_sse_keepalive(mut self, interval: Duration) -> Self {
        self.sse_keepalive_interval = interval;
        self
    }

    fn cors_layer(&self) -> CorsLayer {
        if self.cors_origins.is_empty() {
            return CorsLayer::permissive();
        }

        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring invalid CORS origin '{}'", origin);
                    None
                }
            })
            .collect();

        // Wildcards are not allowed together with credentials, so methods and
        // headers mirror the preflight request.
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
    }
}

#[derive(Clone)]
pub struct AppState<T: ChatBackend> {
    pub backend: T,
    pub config: ServerConfig,
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": "Healthy and running!" }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn chat_handler<T: ChatBackend>(
    State(app_state): State<AppState<T>>,
    payload: std::result::Result<AxumJson<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let AxumJson(request) = payload?;
    log::info!("Chat request with {} message(s)", request.messages.len());
    app_state.backend.validate_input(&request.messages).await?;

    let message = app_state.backend.chat(request.messages).await?;
    Ok(Json(ChatResponse {
        message: message.into(),
    }))
}

async fn chat_stream_handler<T: ChatBackend>(
    State(app_state): State<AppState<T>>,
    payload: std::result::Result<AxumJson<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let AxumJson(request) = payload?;
    log::info!("Streaming chat request with {} message(s)", request.messages.len());
    app_state.backend.validate_input(&request.messages).await?;

    let events = app_state.backend.chat_stream(request.messages).await?;
    Ok(sse::create_sse_response_with_keepalive(
        events,
        app_state.config.sse_keepalive_interval,
        KEEPALIVE_TEXT,
    ))
}

async fn log_request(request: Request<Body>, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();

    if method == Method::GET {
        log::debug!("Request {} {} {}", request_id, method, uri);
    } else {
        log::info!("Request {} {} {}", request_id, method, uri);
    }

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    log::info!(
        "Response {} {} in {:?}",
        request_id,
        response.status(),
        start.elapsed()
    );
    response
}

pub struct ModelOpsServer<T: ChatBackend> {
    backend: T,
    config: ServerConfig,
}

impl<T: ChatBackend> ModelOpsServer<T> {
    pub fn new(backend: T) -> Self {
        Self::with_config(backend, ServerConfig::default())
    }

    pub fn with_config(backend: T, config: ServerConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn build_router(&self) -> Router {
        let state = AppState {
            backend: self.backend.clone(),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/api/chat", post(chat_handler::<T>))
            .route("/api/chat/stream", post(chat_stream_handler::<T>))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(log_request));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(self.config.cors_layer());
        }

        router
    }

    async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.config.bind_addr).await.map_err(|e| {
            ServerError::config_error(format!("Failed to bind to {}: {}", self.config.bind_addr, e))
        })
    }

    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending::<()>()).await
    }

    /// Serve until `shutdown_signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = self.bind().await?;

        log::info!("ModelOps gateway listening on {}", self.config.bind_addr);
        log::info!("Chat endpoint: http://{}/api/chat", self.config.bind_addr);
        log::info!("Stream endpoint: http://{}/api/chat/stream", self.config.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("ModelOps gateway shut down gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
