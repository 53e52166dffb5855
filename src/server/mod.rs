// Chat server
//
// Serves the fine-tuned persona over HTTP. One backend is built at startup and
// shared read-only by every request.

mod error;
mod handlers;
mod types;

pub use error::ApiError;
pub use handlers::{create_router, handle_chat, health_check, DONE_MARKER};
pub use types::{ChatRequest, ChatResponse, HealthResponse};

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::providers::ChatBackend;

/// Request body limit; chat messages are small.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Immutable state shared by all handlers
pub struct AppState {
    pub backend: Arc<dyn ChatBackend>,
    /// Used when a request does not set `stream`
    pub stream_by_default: bool,
}

impl AppState {
    pub fn new(backend: Arc<dyn ChatBackend>, stream_by_default: bool) -> Self {
        Self {
            backend,
            stream_by_default,
        }
    }
}

pub struct ChatServer {
    state: Arc<AppState>,
    bind_address: String,
}

impl ChatServer {
    pub fn new(config: &ServerConfig, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            state: Arc::new(AppState::new(backend, config.stream_by_default)),
            bind_address: config.bind_address.clone(),
        }
    }

    /// Start the HTTP server
    pub async fn serve(self) -> Result<()> {
        let addr: SocketAddr = self
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.bind_address))?;

        let app = create_router(Arc::clone(&self.state))
            .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(TraceLayer::new_for_http());

        tracing::info!(
            backend = self.state.backend.name(),
            model = self.state.backend.default_model(),
            "Starting chat server on {}",
            addr
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
