use std::time::Duration;

use bizpulse_core::AppConfig;

/// Connection settings for an Ollama-compatible generation service.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL without a trailing slash, e.g. `http://localhost:11434`.
    pub base_url: String,
    pub model: String,
    /// Upper bound on one request, including connect and body read.
    pub timeout: Duration,
}

impl ModelConfig {
    /// Returns `None` when no model URL is configured.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Option<Self> {
        config.model_url.as_ref().map(|url| Self {
            base_url: url.trim_end_matches('/').to_string(),
            model: config.model_name.clone(),
            timeout: Duration::from_secs(config.model_timeout_secs),
        })
    }
}
