use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::llm_client::{LlmSettings, DEFAULT_MAX_RETRIES};

/// Application configuration loaded from environment variables.
///
/// Nothing is mandatory: the API key is resolved lazily by the LLM client
/// (explicit flag → `ANTHROPIC_API_KEY` → `llm-config.json`), so dry runs and
/// static-only runs work without credentials.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm_model: Option<String>,
    pub llm_max_retries: u32,
    pub llm_config_path: Option<PathBuf>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            llm_model: optional_env("LLM_MODEL"),
            llm_max_retries: optional_env("LLM_MAX_RETRIES")
                .map(|v| v.parse::<u32>())
                .transpose()
                .context("LLM_MAX_RETRIES must be a non-negative integer")?
                .unwrap_or(DEFAULT_MAX_RETRIES),
            llm_config_path: optional_env("LLM_CONFIG_PATH").map(PathBuf::from),
            port: optional_env("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// LLM settings with per-run overrides applied on top of the environment.
    pub fn llm_settings(
        &self,
        api_key: Option<String>,
        model: Option<String>,
        max_retries: Option<u32>,
    ) -> LlmSettings {
        LlmSettings {
            api_key,
            model: model.or_else(|| self.llm_model.clone()),
            max_retries: Some(max_retries.unwrap_or(self.llm_max_retries)),
            config_path: self.llm_config_path.clone(),
            use_thinking: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_model: None,
            llm_max_retries: DEFAULT_MAX_RETRIES,
            llm_config_path: None,
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_take_precedence() {
        let config = Config {
            llm_model: Some("claude-from-env".to_string()),
            llm_max_retries: 5,
            ..Default::default()
        };

        let settings = config.llm_settings(Some("key".to_string()), Some("claude-cli".to_string()), Some(1));
        assert_eq!(settings.api_key.as_deref(), Some("key"));
        assert_eq!(settings.model.as_deref(), Some("claude-cli"));
        assert_eq!(settings.max_retries, Some(1));
    }

    #[test]
    fn test_environment_values_fill_gaps() {
        let config = Config {
            llm_model: Some("claude-from-env".to_string()),
            llm_max_retries: 5,
            ..Default::default()
        };

        let settings = config.llm_settings(None, None, None);
        assert_eq!(settings.api_key, None);
        assert_eq!(settings.model.as_deref(), Some("claude-from-env"));
        assert_eq!(settings.max_retries, Some(5));
        assert!(settings.use_thinking);
    }
}
