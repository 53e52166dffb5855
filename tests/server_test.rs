// Integration tests for the chat endpoint
//
// The router is driven in-process with tower::ServiceExt::oneshot() against a
// scripted backend that records every call, so no daemon or model is needed.

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, Receiver};
use tower::ServiceExt; // provides .oneshot()

use chatmimic::data::Role;
use chatmimic::providers::{ChatBackend, GenerationRequest};
use chatmimic::server::{create_router, AppState, DONE_MARKER};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct RecordingBackend {
    script: Vec<Result<String, String>>,
    fail_to_start: bool,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl RecordingBackend {
    fn new(script: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            fail_to_start: false,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            script: vec![],
            fail_to_start: true,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for RecordingBackend {
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<Receiver<Result<String>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if self.fail_to_start {
            anyhow::bail!("connection refused");
        }

        let (tx, rx) = mpsc::channel(16);
        for item in &self.script {
            tx.send(item.clone().map_err(anyhow::Error::msg)).await.unwrap();
        }
        Ok(rx)
    }

    fn name(&self) -> &str {
        "recording"
    }

    fn default_model(&self) -> &str {
        "rohan-style-chunk40"
    }
}

fn router(backend: Arc<RecordingBackend>, stream_by_default: bool) -> Router {
    create_router(Arc::new(AppState::new(backend, stream_by_default)))
}

async fn post_chat(app: Router, body: &str) -> axum::response::Response {
    let req = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request");

    app.oneshot(req).await.expect("oneshot failed")
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .expect("failed to read body");
    String::from_utf8(bytes.to_vec()).expect("body is not UTF-8")
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(resp).await).expect("response body is not valid JSON")
}

/// `data:` payloads of an SSE body, in order.
fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_content_is_rejected_before_backend() {
    let backend = RecordingBackend::new(vec![Ok("never".into())]);

    for body in [
        "",
        "   ",
        "{}",
        r#"{"content": ""}"#,
        r#"{"content": "   "}"#,
        r#"{"messages": []}"#,
        r#"{"messages": [{"role": "user", "content": ""}]}"#,
        "not json",
        r#""just a string""#,
    ] {
        let resp = post_chat(router(backend.clone(), true), body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {body:?}");

        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "bad_request");
        assert!(json["error"]["message"].is_string());
    }

    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_unknown_role_is_rejected() {
    let backend = RecordingBackend::new(vec![]);
    let resp = post_chat(
        router(backend.clone(), true),
        r#"{"messages": [{"role": "moderator", "content": "hi"}]}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(backend.calls(), 0);
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_stream_fragments_then_done() {
    let backend = RecordingBackend::new(vec![Ok("Hel".into()), Ok("".into()), Ok("lo".into())]);
    let resp = post_chat(router(backend.clone(), true), r#"{"content": "hi"}"#).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let events = sse_data(&body_text(resp).await);
    assert_eq!(events.len(), 3);
    let first: Value = serde_json::from_str(&events[0]).unwrap();
    let second: Value = serde_json::from_str(&events[1]).unwrap();
    assert_eq!(first["response"], "Hel");
    assert_eq!(second["response"], "lo");
    assert_eq!(events[2], DONE_MARKER);

    assert_eq!(backend.calls(), 1);
    let request = backend.last_request().unwrap();
    assert_eq!(request.model, "rohan-style-chunk40");
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, Role::User);
    assert_eq!(request.messages[0].content, "hi");
}

#[tokio::test]
async fn test_stream_error_event_then_done() {
    let backend = RecordingBackend::new(vec![
        Ok("partial".into()),
        Err("model crashed".into()),
        Ok("ignored".into()),
    ]);
    let resp = post_chat(router(backend, true), r#"{"content": "hi"}"#).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let events = sse_data(&body_text(resp).await);
    assert_eq!(events.len(), 3);
    let error: Value = serde_json::from_str(&events[1]).unwrap();
    assert!(error["error"].as_str().unwrap().contains("model crashed"));
    assert_eq!(events[2], DONE_MARKER);
}

#[tokio::test]
async fn test_failure_before_first_fragment_is_server_error() {
    let backend = RecordingBackend::new(vec![
        Ok("".into()),
        Err("Prompt is 5000 tokens, the model accepts at most 2048".into()),
    ]);
    let resp = post_chat(router(backend.clone(), true), r#"{"content": "hi"}"#).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "backend_unavailable");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("5000 tokens"));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_empty_reply_streams_only_done() {
    let backend = RecordingBackend::new(vec![]);
    let resp = post_chat(router(backend, true), r#"{"content": "hi"}"#).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let events = sse_data(&body_text(resp).await);
    assert_eq!(events, vec![DONE_MARKER.to_string()]);
}

#[tokio::test]
async fn test_backend_unavailable_is_server_error() {
    let backend = RecordingBackend::unavailable();
    let resp = post_chat(router(backend.clone(), true), r#"{"content": "hi"}"#).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "backend_unavailable");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
    assert_eq!(backend.calls(), 1);
}

// ---------------------------------------------------------------------------
// Non-streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_non_stream_response() {
    let backend = RecordingBackend::new(vec![Ok("yo ".into()), Ok("what's up".into())]);
    let resp = post_chat(
        router(backend.clone(), true),
        r#"{"messages": [
            {"role": "system", "content": "You are Rohan."},
            {"role": "user", "content": "hey"}
        ], "model": "custom", "stream": false}"#,
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["response"], "yo what's up");
    assert_eq!(json["model"], "custom");

    let request = backend.last_request().unwrap();
    assert_eq!(request.model, "custom");
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, Role::System);
}

#[tokio::test]
async fn test_stream_by_default_off() {
    let backend = RecordingBackend::new(vec![Ok("ok".into())]);
    let resp = post_chat(router(backend, false), r#"{"content": "hi"}"#).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["response"], "ok");
    assert_eq!(json["model"], "rohan-style-chunk40");
}

#[tokio::test]
async fn test_non_stream_generation_error() {
    let backend = RecordingBackend::new(vec![Err("out of memory".into())]);
    let resp = post_chat(router(backend, false), r#"{"content": "hi"}"#).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "generation_failed");
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health() {
    let backend = RecordingBackend::new(vec![]);
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("failed to build request");

    let resp = router(backend.clone(), true).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["backend"], "recording");
    assert_eq!(json["model"], "rohan-style-chunk40");
    assert_eq!(backend.calls(), 0);
}
