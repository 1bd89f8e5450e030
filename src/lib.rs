//! # paperstream
//!
//! Multi-source scholarly paper aggregation with AI analysis and streamed
//! progress.
//!
//! ## Modules
//!
//! - [`arxiv`] - arXiv API client (the preprint index)
//! - [`semantic`] - Semantic Scholar API client (the citation graph)
//! - [`suggest`] - Generative essay and related-paper suggestions
//! - [`resolve`] - Fallback resolution of related-work references
//! - [`pipeline`] - Aggregation pipeline and event stream
//! - [`ident`] - Tagged paper identifiers
//! - [`config`] - Startup-time credential resolution
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use paperstream::config::Credentials;
//! use paperstream::pipeline::{search_stream, Event, SearchContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = Arc::new(SearchContext::new(Credentials::from_env()));
//!     let mut events = search_stream(ctx, "graph neural networks".to_string(), 4);
//!     while let Some(event) = events.recv().await {
//!         if let Event::Record(record) = event {
//!             println!("{}: {}", record.id, record.title);
//!         }
//!     }
//! }
//! ```

pub mod arxiv;
pub mod config;
pub mod error;
pub mod ident;
pub mod paper;
pub mod pipeline;
pub mod prompts;
pub mod resolve;
pub mod semantic;
pub mod suggest;

pub use error::{PaperstreamError, Result};
