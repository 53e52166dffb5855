// Configuration loader
// Loads ~/.chatmimic/config.toml (optional) and applies environment overrides

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::constants::{CONFIG_DIR, CONFIG_FILE, ENV_BIND, ENV_MODEL_PATH, ENV_OLLAMA_URL};
use super::settings::Config;

/// Default config file location, if a home directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, `~/.chatmimic/config.toml` is read
/// when present and built-in defaults are used otherwise. Environment overrides
/// are applied last.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => read_config_file(&path)?,
            _ => {
                debug!("No config file found, using defaults");
                Config::default()
            }
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Apply `CHATMIMIC_MODEL_PATH`, `OLLAMA_URL` and `CHATMIMIC_BIND`. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(path) = get(ENV_MODEL_PATH) {
        config.local.model_path = Some(PathBuf::from(path));
    }
    if let Some(url) = get(ENV_OLLAMA_URL) {
        config.ollama.base_url = url;
    }
    if let Some(bind) = get(ENV_BIND) {
        config.server.bind_address = bind;
    }
}
