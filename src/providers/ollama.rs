// Ollama backend
//
// Forwards chats to an Ollama daemon's /api/chat endpoint. The streaming
// response is newline-delimited JSON, one chunk per line.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use super::types::GenerationRequest;
use super::ChatBackend;
use crate::config::constants::STREAM_CHANNEL_CAPACITY;
use crate::config::OllamaConfig;
use crate::data::Turn;

#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaBackend {
    pub fn new(config: &OllamaConfig, default_model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_model: default_model.into(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn to_ollama_request<'a>(&'a self, request: &'a GenerationRequest, stream: bool) -> OllamaRequest<'a> {
        let model: &str = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };
        OllamaRequest {
            model,
            messages: request.messages.as_slice(),
            stream,
        }
    }

    async fn post(&self, body: &OllamaRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.chat_url())
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!(
                "Ollama request failed\n\nStatus: {}\nBody: {}",
                status,
                error_body
            );
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = self.to_ollama_request(request, false);
        tracing::debug!(model = body.model, "Sending chat request to Ollama");

        let response = self.post(&body).await?;
        let chunk: OllamaChunk = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;
        if let Some(error) = chunk.error {
            bail!("Ollama error: {}", error);
        }
        Ok(chunk.message.map(|m| m.content).unwrap_or_default())
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        let body = self.to_ollama_request(request, true);
        tracing::debug!(model = body.model, "Sending streaming chat request to Ollama");

        let response = self.post(&body).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = Vec::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(anyhow::anyhow!("Ollama stream error: {}", e))).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    match handle_line(&line_bytes) {
                        LineOutcome::Skip => {}
                        LineOutcome::Fragment(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                tracing::debug!("Stream receiver dropped, stopping");
                                return;
                            }
                        }
                        LineOutcome::Done => return,
                        LineOutcome::Error(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // Final line without a trailing newline
            match handle_line(&buffer) {
                LineOutcome::Fragment(text) => {
                    let _ = tx.send(Ok(text)).await;
                }
                LineOutcome::Error(e) => {
                    let _ = tx.send(Err(e)).await;
                }
                LineOutcome::Skip | LineOutcome::Done => {}
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

enum LineOutcome {
    Skip,
    Fragment(String),
    Done,
    Error(anyhow::Error),
}

fn handle_line(line_bytes: &[u8]) -> LineOutcome {
    let line = String::from_utf8_lossy(line_bytes);
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }

    let chunk: OllamaChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            return LineOutcome::Error(anyhow::anyhow!("Invalid Ollama stream chunk: {}", e))
        }
    };

    if let Some(error) = chunk.error {
        return LineOutcome::Error(anyhow::anyhow!("Ollama error: {}", error));
    }
    let text = chunk.message.map(|m| m.content).unwrap_or_default();
    if chunk.done {
        // The closing chunk may still carry text
        return if text.is_empty() {
            LineOutcome::Done
        } else {
            LineOutcome::Fragment(text)
        };
    }
    if text.is_empty() {
        LineOutcome::Skip
    } else {
        LineOutcome::Fragment(text)
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}
