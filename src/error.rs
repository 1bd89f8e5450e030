//! Custom error types for paperstream.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, PaperstreamError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for paperstream operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
///
/// Most of these never reach a stream consumer: source adapters and the
/// suggestion engine absorb their own failures and degrade to empty output.
#[derive(Debug, Error)]
pub enum PaperstreamError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Malformed upstream payload or generated text
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code from API
        code: i32,
        /// Error message from API
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (missing or unusable credential)
    #[error("Config error: {0}")]
    Config(String),

    /// Neither catalog returned anything for a topic search
    #[error("No results found")]
    NoResults,
}

/// Result type alias using `PaperstreamError`
pub type Result<T> = std::result::Result<T, PaperstreamError>;
