//! API key lookup: explicit key, then environment, then `llm-config.json`.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::LlmError;

/// Environment variable consulted when no explicit key is given.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
/// Local config file consulted last, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "llm-config.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmConfigFile {
    api_key: Option<String>,
}

/// Resolves the Anthropic API key.
///
/// Order: `explicit` → `ANTHROPIC_API_KEY` → `apiKey` in the config file
/// (`config_path`, default `./llm-config.json`). Fails with `LlmError::Auth`
/// naming all three places.
pub fn resolve_api_key(explicit: Option<&str>, config_path: Option<&Path>) -> Result<String, LlmError> {
    let env_value = std::env::var(API_KEY_ENV).ok();
    let config_path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    resolve_from(explicit, env_value.as_deref(), config_path)
}

fn resolve_from(
    explicit: Option<&str>,
    env_value: Option<&str>,
    config_path: &Path,
) -> Result<String, LlmError> {
    if let Some(key) = non_blank(explicit) {
        debug!("Using API key supplied by caller");
        return Ok(key.to_string());
    }

    if let Some(key) = non_blank(env_value) {
        debug!("Using API key from {API_KEY_ENV}");
        return Ok(key.to_string());
    }

    if config_path.exists() {
        let raw = std::fs::read_to_string(config_path).map_err(|e| {
            LlmError::Auth(format!("Could not read {}: {e}", config_path.display()))
        })?;
        let config: LlmConfigFile = serde_json::from_str(&raw).map_err(|e| {
            LlmError::Auth(format!("Could not parse {}: {e}", config_path.display()))
        })?;
        if let Some(key) = non_blank(config.api_key.as_deref()) {
            debug!("Using API key from {}", config_path.display());
            return Ok(key.to_string());
        }
    }

    Err(LlmError::Auth(format!(
        "No API key found. Pass --api-key, set the {API_KEY_ENV} environment variable, \
        or add an \"apiKey\" property to {}",
        config_path.display()
    )))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
