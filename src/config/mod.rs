// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod settings;

pub use loader::{apply_env_overrides, default_config_path, load_config};
pub use settings::{
    BackendKind, Config, LocalConfig, OllamaConfig, ServerConfig, TemplateKind, TrainingConfig,
};
