// Generation backends
//
// The chat endpoint talks to exactly one backend, chosen at startup: an
// external Ollama daemon or a model loaded in-process.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

pub mod factory;
#[cfg(feature = "candle")]
pub mod local;
pub mod ollama;
pub mod template;
pub mod types;

pub use factory::create_backend;
#[cfg(feature = "candle")]
pub use local::LocalBackend;
pub use ollama::OllamaBackend;
pub use types::GenerationRequest;

/// Trait for generation backends
///
/// Implementations are constructed once and shared read-only across requests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Generate the complete reply
    ///
    /// The default collects the streamed fragments.
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let mut rx = self.generate_stream(request).await?;
        let mut text = String::new();
        while let Some(fragment) = rx.recv().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    /// Stream the reply as text fragments
    ///
    /// Errors before generation starts are returned directly; later failures
    /// arrive as an `Err` item. The channel closes when the reply is complete.
    async fn generate_stream(&self, request: &GenerationRequest)
        -> Result<Receiver<Result<String>>>;

    /// Backend name (e.g., "ollama", "local")
    fn name(&self) -> &str;

    /// Model used when a request does not name one
    fn default_model(&self) -> &str;
}
