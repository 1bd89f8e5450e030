//! Startup-time credential resolution.
//!
//! Credentials are resolved exactly once, before any request runs, and the
//! resulting [`Credentials`] value is passed into the adapter and engine
//! constructors. Nothing re-reads the environment at request time. A
//! missing credential disables its capability; it never fails the process.

use tracing::warn;

use crate::suggest::LlmConfig;

/// Citation-graph API key
pub const SEMANTIC_KEY_ENV: &str = "SEMANTIC_API";
/// Generative endpoint base URL (OpenAI-compatible)
pub const LLM_BASE_URL_ENV: &str = "LLM_BASE_URL";
/// Generative endpoint API key
pub const LLM_API_KEY_ENV: &str = "LLM_API_KEY";
/// Generative model name
pub const LLM_MODEL_ENV: &str = "LLM_MODEL";

/// Model used when none is configured
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Resolved credentials for the two optional capabilities.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Citation-graph key; `None` leaves that catalog unavailable
    pub semantic_api_key: Option<String>,
    /// Generative endpoint; `None` degrades the suggestion engine to
    /// empty output
    pub llm: Option<LlmConfig>,
}

impl Credentials {
    /// Resolve credentials from the environment.
    pub fn from_env() -> Self {
        let semantic_api_key = non_empty_env(SEMANTIC_KEY_ENV);
        let llm = match (non_empty_env(LLM_BASE_URL_ENV), non_empty_env(LLM_API_KEY_ENV)) {
            (Some(base_url), Some(api_key)) => Some(LlmConfig {
                base_url,
                api_key,
                model: non_empty_env(LLM_MODEL_ENV)
                    .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            }),
            _ => None,
        };
        Self {
            semantic_api_key,
            llm,
        }
    }

    /// Overlay CLI flags on top of environment values; flags win.
    pub fn with_overrides(
        mut self,
        semantic_key: Option<String>,
        llm_base_url: Option<String>,
        llm_api_key: Option<String>,
        llm_model: Option<String>,
    ) -> Self {
        if let Some(key) = non_empty(semantic_key) {
            self.semantic_api_key = Some(key);
        }
        let base_url =
            non_empty(llm_base_url).or_else(|| self.llm.as_ref().map(|l| l.base_url.clone()));
        let api_key =
            non_empty(llm_api_key).or_else(|| self.llm.as_ref().map(|l| l.api_key.clone()));
        let model = non_empty(llm_model)
            .or_else(|| self.llm.as_ref().map(|l| l.model.clone()))
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());
        self.llm = match (base_url, api_key) {
            (Some(base_url), Some(api_key)) => Some(LlmConfig {
                base_url,
                api_key,
                model,
            }),
            _ => None,
        };
        self
    }

    /// Log which capabilities are active. Call once at startup.
    pub fn log_capabilities(&self) {
        if self.semantic_api_key.is_none() {
            warn!("{SEMANTIC_KEY_ENV} not set; citation-graph source disabled");
        }
        if self.llm.is_none() {
            warn!("LLM credentials not set; essays and AI suggestions disabled");
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_empty_env(key: &str) -> Option<String> {
    non_empty(std::env::var(key).ok())
}
