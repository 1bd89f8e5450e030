//! Suggestion engine wrapping the generative text capability.
//!
//! Produces the analytical essay and the raw related-paper suggestions for
//! an abstract. The engine never errors: an unconfigured credential or an
//! empty abstract yields empty output, a failed generation yields a
//! recognizable marker (essay) or nothing (suggestions), and malformed
//! generated lines are skipped one at a time.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{PaperstreamError, Result};
use crate::ident::{classify, PaperId};
use crate::prompts::{build_essay_prompt, build_related_prompt};

/// Marker distinguishing "essay attempted and failed" from "no essay
/// attempted" (empty string). Consumers can rely on this exact value.
pub const ESSAY_FAILED_MARKER: &str = "[essay unavailable: generation failed]";

/// Request timeout for generation calls
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Generative endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL, e.g. "https://api.openai.com/v1"
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// The opaque "generate text from prompt" capability.
///
/// Kept as a trait so tests can drive the engine with canned output.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// === OpenAI-compatible API response structures ===

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Production generator speaking an OpenAI-compatible chat-completions
/// endpoint.
pub struct GenTextClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl GenTextClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

#[async_trait]
impl TextGenerator for GenTextClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.7,
        });

        let api_url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PaperstreamError::Api {
                code: i32::from(status.as_u16()),
                message: format!("LLM API error: {status} - {error_text}"),
            });
        }

        let body = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PaperstreamError::Parse("LLM response had no choices".to_string()))
    }
}

/// One parsed `<ID>::<Title>` suggestion line.
///
/// `id` may be [`PaperId::Unknown`]; the fallback resolver title-resolves
/// those using `raw_id` concatenated with `title` and drops them when
/// resolution fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub id: PaperId,
    pub raw_id: String,
    pub title: String,
}

/// Parse generated related-work output line-by-line.
///
/// Lines without the `::` separator (or entirely empty) are skipped
/// without raising and without shrinking the caller's target count.
pub fn parse_suggestions(raw: &str) -> Vec<Suggestion> {
    raw.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let (id_part, title_part) = line.split_once("::")?;
            let raw_id = id_part.trim().to_string();
            let title = title_part.trim().to_string();
            if raw_id.is_empty() && title.is_empty() {
                return None;
            }
            Some(Suggestion {
                id: classify(&raw_id),
                raw_id,
                title,
            })
        })
        .collect()
}

/// Engine pairing the generative capability with the two prompts.
/// `None` means the capability is unconfigured and every call degrades
/// to empty output.
pub struct SuggestionEngine {
    generator: Option<Box<dyn TextGenerator>>,
}

impl SuggestionEngine {
    pub fn new(generator: Box<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// Engine without a generative capability; all output is empty.
    pub fn unconfigured() -> Self {
        Self { generator: None }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    /// Analytical essay for an abstract.
    ///
    /// Empty abstract or unconfigured capability yields `""` (no attempt);
    /// a failed generation yields [`ESSAY_FAILED_MARKER`]. Never errors.
    pub async fn essay(&self, abstract_text: &str) -> String {
        let Some(generator) = &self.generator else {
            return String::new();
        };
        if abstract_text.trim().is_empty() {
            return String::new();
        }
        match generator.generate(&build_essay_prompt(abstract_text)).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "essay generation failed");
                ESSAY_FAILED_MARKER.to_string()
            }
        }
    }

    /// Raw generated related-work lines for an abstract, or `None` when the
    /// capability is unconfigured, the abstract is empty, or generation
    /// failed.
    pub async fn related_lines(&self, abstract_text: &str, count: usize) -> Option<String> {
        let generator = self.generator.as_ref()?;
        if abstract_text.trim().is_empty() || count == 0 {
            return None;
        }
        match generator
            .generate(&build_related_prompt(abstract_text, count))
            .await
        {
            Ok(raw) => {
                debug!(lines = raw.lines().count(), "related-work suggestions generated");
                Some(raw)
            }
            Err(e) => {
                warn!(error = %e, "related-work generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(PaperstreamError::Parse("boom".to_string()))
        }
    }

    #[test]
    fn test_parse_suggestions_skips_malformed_lines() {
        let raw = "arXiv:2301.12345::First Paper\n\
                   S2:abc123::Second Paper\n\
                   this line has no separator\n\
                   Unknown::Fourth Paper\n\
                   2107.03374::Fifth Paper";
        let parsed = parse_suggestions(raw);
        // Line 3 is ignored; lines 4-5 are still consumed
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[0].id, PaperId::Arxiv("2301.12345".to_string()));
        assert_eq!(parsed[1].id, PaperId::Semantic("abc123".to_string()));
        assert_eq!(parsed[2].id, PaperId::Unknown);
        assert_eq!(parsed[2].raw_id, "Unknown");
        assert_eq!(parsed[3].id, PaperId::Arxiv("2107.03374".to_string()));
    }

    #[test]
    fn test_parse_suggestions_whitespace_and_empty() {
        assert!(parse_suggestions("").is_empty());
        assert!(parse_suggestions("   \n\t\n").is_empty());
        assert!(parse_suggestions("::").is_empty());
        // A missing id with a usable title is kept for title resolution
        let parsed = parse_suggestions("::Only A Title");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, PaperId::Unknown);
        assert_eq!(parsed[0].title, "Only A Title");
    }

    #[tokio::test]
    async fn test_essay_unconfigured_is_empty() {
        let engine = SuggestionEngine::unconfigured();
        assert_eq!(engine.essay("Some abstract").await, "");
        assert!(engine.related_lines("Some abstract", 4).await.is_none());
    }

    #[tokio::test]
    async fn test_essay_empty_abstract_is_not_attempted() {
        let engine = SuggestionEngine::new(Box::new(FixedGenerator("An essay.")));
        assert_eq!(engine.essay("   ").await, "");
    }

    #[tokio::test]
    async fn test_essay_failure_yields_marker() {
        let engine = SuggestionEngine::new(Box::new(FailingGenerator));
        assert_eq!(engine.essay("An abstract.").await, ESSAY_FAILED_MARKER);
        assert!(engine.related_lines("An abstract.", 4).await.is_none());
    }

    #[tokio::test]
    async fn test_essay_success_is_trimmed() {
        let engine = SuggestionEngine::new(Box::new(FixedGenerator("  An essay.\n")));
        assert_eq!(engine.essay("An abstract.").await, "An essay.");
    }
}
