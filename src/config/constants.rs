// Project-wide constants
//
// Centralised here so ports, file names and caps have one source of truth.
// Import via `use crate::config::constants::*;`.

/// Default bind address for `chatmimic serve` (localhost only).
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8000";

/// Where a local Ollama daemon listens by default.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Request timeout towards the generation daemon.
pub const DEFAULT_OLLAMA_TIMEOUT_SECS: u64 = 60;

/// Model name requested when a chat request does not name one.
pub const DEFAULT_CHAT_MODEL: &str = "rohan-style";

/// Base model for local inference and training.
pub const DEFAULT_BASE_MODEL: &str = "TinyLlama/TinyLlama-1.1B-Chat-v1.0";

/// Config directory under `$HOME`.
pub const CONFIG_DIR: &str = ".chatmimic";
pub const CONFIG_FILE: &str = "config.toml";

// Environment overrides
pub const ENV_MODEL_PATH: &str = "CHATMIMIC_MODEL_PATH";
pub const ENV_OLLAMA_URL: &str = "OLLAMA_URL";
pub const ENV_BIND: &str = "CHATMIMIC_BIND";

// Default pipeline file names
pub const DEFAULT_SCRAPE_OUTPUT: &str = "discord_messages_processed.jsonl";
pub const DEFAULT_PREPARE_OUTPUT: &str = "finetune_data.jsonl";
pub const DEFAULT_COMBINE_OUTPUT: &str = "combined_training_data.jsonl";
pub const DEFAULT_MODELFILE_OUTPUT: &str = "Modelfile.train";
pub const DEFAULT_TRAIN_OUTPUT_DIR: &str = "output/chatmimic-lora";

/// Records kept by `combine` unless told otherwise.
pub const DEFAULT_COMBINE_CAP: usize = 80_000;

/// Messages shown after a scrape.
pub const SCRAPE_SAMPLE_SIZE: usize = 5;

// Modelfile export
pub const DEFAULT_MODELFILE_BASE: &str = "llama3";
pub const DEFAULT_MODELFILE_MAX_MESSAGES: usize = 1000;
pub const DEFAULT_MODELFILE_SYSTEM: &str =
    "You are a helpful assistant that responds in a casual, conversational style.";
pub const MODELFILE_NUM_CTX: u32 = 4096;

// Training run layout
pub const TRAIN_FILE: &str = "training_data.jsonl";
pub const VALIDATION_FILE: &str = "validation_data.jsonl";
pub const TRAINING_ARGS_FILE: &str = "training_args.json";
pub const METRICS_FILE: &str = "metrics.json";
/// Written by the framework, merged into `metrics.json` when present.
pub const FRAMEWORK_METRICS_FILE: &str = "train_metrics.json";
pub const ADAPTER_DIR: &str = "adapter";
pub const CHECKPOINT_PREFIX: &str = "checkpoint-";

/// Stderr lines of a failed training run kept for the error report.
pub const STDERR_TAIL_LINES: usize = 20;

// Local sampling defaults
pub const DEFAULT_MAX_NEW_TOKENS: usize = 256;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_SEED: u64 = 299_792_458;
pub const REPEAT_PENALTY: f32 = 1.1;
pub const REPEAT_LAST_N: usize = 64;

/// Buffer size of the fragment channel between a backend and the SSE writer.
pub const STREAM_CHANNEL_CAPACITY: usize = 100;
