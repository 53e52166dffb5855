// HTTP request handlers

use axum::{
    body::Bytes,
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::types::{ChatRequest, ChatResponse, HealthResponse};
use super::AppState;
use crate::config::constants::STREAM_CHANNEL_CAPACITY;
use crate::providers::GenerationRequest;

/// Marker sent as the last event of every stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        backend: state.backend.name().to_string(),
        model: state.backend.default_model().to_string(),
    })
}

/// Chat endpoint
///
/// Empty, malformed or content-free bodies get a 400 before the backend is called.
pub async fn handle_chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("Request body is empty".to_string()));
    }
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;

    let turns = request.turns()?;
    let model = request
        .model()
        .unwrap_or_else(|| state.backend.default_model())
        .to_string();
    let stream = request.stream.unwrap_or(state.stream_by_default);
    let generation = GenerationRequest::new(turns, model.clone());

    info!(
        model = %model,
        turns = generation.messages.len(),
        stream,
        backend = state.backend.name(),
        "Chat request"
    );

    if stream {
        stream_reply(&state, &generation).await
    } else {
        let response = state
            .backend
            .generate(&generation)
            .await
            .map_err(|e| ApiError::Generation(format!("{:#}", e)))?;
        debug!(chars = response.len(), "Reply complete");
        Ok(Json(ChatResponse { response, model }).into_response())
    }
}

async fn stream_reply(
    state: &AppState,
    generation: &GenerationRequest,
) -> Result<Response, ApiError> {
    let mut fragments = state
        .backend
        .generate_stream(generation)
        .await
        .map_err(|e| ApiError::BackendUnavailable(format!("{:#}", e)))?;

    // The status line is only committed once the backend has produced something
    let first = loop {
        match fragments.recv().await {
            Some(Ok(text)) if text.is_empty() => continue,
            Some(Ok(text)) => break Some(text),
            Some(Err(e)) => return Err(ApiError::BackendUnavailable(format!("{:#}", e))),
            None => break None,
        }
    };

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(forward_fragments(first, fragments, tx));

    Ok(Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// Relay backend fragments as SSE events, always finishing with the done marker.
///
/// `first` is the fragment already taken off the channel. A backend error ends
/// the stream with one `{"error": ..}` event.
async fn forward_fragments(
    first: Option<String>,
    mut fragments: mpsc::Receiver<anyhow::Result<String>>,
    tx: mpsc::Sender<Result<Event, Infallible>>,
) {
    let mut sent = 0usize;
    if let Some(text) = first {
        if tx.send(Ok(fragment_event(text))).await.is_err() {
            return;
        }
        sent += 1;

        while let Some(item) = fragments.recv().await {
            let event = match item {
                Ok(text) if text.is_empty() => continue,
                Ok(text) => {
                    sent += 1;
                    fragment_event(text)
                }
                Err(e) => {
                    warn!(fragments = sent, "Generation failed mid-stream: {:#}", e);
                    let event =
                        Event::default().data(json!({ "error": format!("{:#}", e) }).to_string());
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                    break;
                }
            };
            if tx.send(Ok(event)).await.is_err() {
                debug!(fragments = sent, "Client disconnected");
                return;
            }
        }
    }

    let _ = tx.send(Ok(Event::default().data(DONE_MARKER))).await;
    debug!(fragments = sent, "Stream complete");
}

fn fragment_event(response: String) -> Event {
    Event::default().data(json!({ "response": response }).to_string())
}
