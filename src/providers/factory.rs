// Backend factory
//
// Builds the configured ChatBackend once at startup.

use anyhow::Result;
use std::sync::Arc;

use super::ollama::OllamaBackend;
use super::ChatBackend;
use crate::config::{BackendKind, Config};

/// Create the backend selected in `config.server.backend`.
///
/// Loading a local model reads the full weights, so it runs on a blocking thread.
pub async fn create_backend(config: &Config) -> Result<Arc<dyn ChatBackend>> {
    match config.server.backend {
        BackendKind::Ollama => {
            let backend = OllamaBackend::new(&config.ollama, config.server.default_model.clone())?;
            tracing::info!(url = %config.ollama.base_url, "Using Ollama backend");
            Ok(Arc::new(backend))
        }
        BackendKind::Local => create_local(config).await,
    }
}

#[cfg(feature = "candle")]
async fn create_local(config: &Config) -> Result<Arc<dyn ChatBackend>> {
    use anyhow::Context;

    let local = config.local.clone();
    let backend = tokio::task::spawn_blocking(move || super::local::LocalBackend::load(&local))
        .await
        .context("Model loading task panicked")??;
    tracing::info!(model = backend.default_model(), "Using local backend");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "candle"))]
async fn create_local(_config: &Config) -> Result<Arc<dyn ChatBackend>> {
    anyhow::bail!("The local backend requires building with the `candle` feature")
}
