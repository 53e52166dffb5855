// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::constants::*;
use crate::training::Hyperparameters;

/// Which generation backend `serve` talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// External Ollama daemon over HTTP
    #[default]
    Ollama,
    /// Model loaded in-process with candle
    Local,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Ollama => write!(f, "ollama"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}

/// Prompt layout used when formatting turns for a local model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// `<|system|>` / `<|user|>` / `<|assistant|>` blocks (TinyLlama, Zephyr)
    #[default]
    Zephyr,
    /// Llama 3 header tokens
    Llama3,
    /// Plain `### Instruction:` / `### Response:`
    Instruction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub default_model: String,
    pub backend: BackendKind,
    pub stream_by_default: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_HTTP_ADDR.to_string(),
            default_model: DEFAULT_CHAT_MODEL.to_string(),
            backend: BackendKind::default(),
            stream_by_default: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: DEFAULT_OLLAMA_TIMEOUT_SECS,
        }
    }
}

/// In-process inference settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// HuggingFace repo used when no fine-tuned model directory is available
    pub base_model: String,
    /// Fine-tuned model or adapter directory (usually set through the environment)
    pub model_path: Option<PathBuf>,
    pub template: TemplateKind,
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub seed: u64,
    /// Run on CUDA when built with the `cuda` feature
    pub use_gpu: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_model: DEFAULT_BASE_MODEL.to_string(),
            model_path: None,
            template: TemplateKind::default(),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            seed: DEFAULT_SEED,
            use_gpu: false,
        }
    }
}

/// How training runs are launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Framework invocation; the driver appends the run's file arguments
    pub command: Vec<String>,
    pub base_model: String,
    pub max_examples: usize,
    pub validation_fraction: f64,
    pub seed: u64,
    pub hyperparameters: Hyperparameters,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "python".to_string(),
                "-m".to_string(),
                "chatmimic_trainer".to_string(),
            ],
            base_model: DEFAULT_BASE_MODEL.to_string(),
            max_examples: 10_000,
            validation_fraction: 0.1,
            seed: 42,
            hyperparameters: Hyperparameters::default(),
        }
    }
}

/// Full application configuration. Every section is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ollama: OllamaConfig,
    pub local: LocalConfig,
    pub training: TrainingConfig,
}
