//! paperstream - multi-source scholarly paper aggregation.
//!
//! Searches arXiv and Semantic Scholar for a topic, enriches every hit with
//! an AI-generated analytical essay and a bounded related-work list, and
//! streams progress incrementally.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! paperstream search "graph neural networks" -n 4
//! paperstream details "arXiv:2301.12345"
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! paperstream serve --port 3000
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, Subcommand};
use paperstream::config::Credentials;
use paperstream::paper::PaperRecord;
use paperstream::pipeline::{detail_stream, search_stream, Event, SearchContext};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Multi-source scholarly paper aggregation with AI analysis
#[derive(Parser)]
#[command(name = "paperstream")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Semantic Scholar API key (falls back to SEMANTIC_API)
    #[arg(long, global = true)]
    semantic_key: Option<String>,

    /// LLM API base URL (falls back to LLM_BASE_URL, e.g. https://api.openai.com/v1)
    #[arg(long, global = true)]
    llm_base_url: Option<String>,

    /// LLM API key (falls back to LLM_API_KEY)
    #[arg(long, global = true)]
    llm_key: Option<String>,

    /// LLM model name (falls back to LLM_MODEL)
    #[arg(long, global = true)]
    llm_model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a topic across both catalogs and stream results
    Search {
        /// Topic keywords
        topic: String,

        /// Number of papers to aggregate
        #[arg(short = 'n', long, default_value_t = 4)]
        count: usize,
    },

    /// Fetch one paper by wire id (e.g. "arXiv:2301.12345" or "S2:<id>")
    Details {
        /// Wire-form paper id
        id: String,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    // Credentials resolve once, before any request runs
    let credentials = Credentials::from_env().with_overrides(
        cli.semantic_key,
        cli.llm_base_url,
        cli.llm_key,
        cli.llm_model,
    );
    credentials.log_capabilities();
    let ctx = Arc::new(SearchContext::new(credentials));

    match cli.command {
        Commands::Search { topic, count } => run_search_cli(ctx, topic, count).await,
        Commands::Details { id } => run_details_cli(ctx, id).await,
        Commands::Serve { port, host } => run_server(ctx, host, port).await,
    }
}

// ============================================================================
// CLI Consumers
// ============================================================================

async fn run_search_cli(ctx: Arc<SearchContext>, topic: String, count: usize) -> Result<()> {
    let mut events = search_stream(ctx, topic, count);
    while let Some(event) = events.recv().await {
        match event {
            Event::Status(message) => println!("{message}"),
            Event::Record(record) => print_record(&record),
            Event::RecordSetComplete(_) => {}
            Event::DetailError(message) => eprintln!("error: {message}"),
            Event::Done(count) => println!("\n✓ Done ({count} papers)"),
        }
    }
    Ok(())
}

async fn run_details_cli(ctx: Arc<SearchContext>, id: String) -> Result<()> {
    let mut events = detail_stream(ctx, id);
    let mut failure: Option<String> = None;
    while let Some(event) = events.recv().await {
        match event {
            Event::Status(message) => println!("{message}"),
            Event::Record(record) => print_record(&record),
            Event::DetailError(message) => failure = Some(message),
            Event::RecordSetComplete(_) | Event::Done(_) => {}
        }
    }
    if let Some(message) = failure {
        anyhow::bail!(message);
    }
    Ok(())
}

fn print_record(record: &PaperRecord) {
    println!();
    println!("{} [{}]", record.title, record.id);
    if !record.authors.is_empty() {
        println!("  authors: {}", record.authors.join(", "));
    }
    match record.year {
        Some(year) => println!("  venue: {} ({year})", record.venue),
        None => println!("  venue: {}", record.venue),
    }
    if record.citation_count > 0 {
        println!(
            "  citations: {} ({} influential)",
            record.citation_count, record.influential_citation_count
        );
    }
    if !record.url.is_empty() {
        println!("  url: {}", record.url);
    }
    println!("  related:");
    for reference in &record.references {
        println!("    - {} :: {}", reference.id, reference.title);
    }
    if !record.essay.is_empty() {
        println!("  essay:");
        for line in record.essay.lines() {
            println!("    {line}");
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(ctx: Arc<SearchContext>, host: String, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/search", post(search_handler))
        .route("/paper/{id}", get(paper_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "listening");
    println!("Listening on http://{addr}");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Search request body
#[derive(Debug, Deserialize)]
struct SearchRequest {
    topic: String,
    #[serde(default = "default_count")]
    count: usize,
}

fn default_count() -> usize {
    4
}

/// Search response
#[derive(Debug, Serialize)]
struct SearchResponse {
    status: String,
    count: usize,
    results: Vec<PaperRecord>,
}

/// Search endpoint handler: drains the event stream and responds with the
/// complete record set.
async fn search_handler(
    State(ctx): State<Arc<SearchContext>>,
    Json(request): Json<SearchRequest>,
) -> Json<SearchResponse> {
    info!(topic = %request.topic, count = request.count, "search request");

    let mut events = search_stream(ctx, request.topic, request.count);
    let mut results = Vec::new();
    while let Some(event) = events.recv().await {
        if let Event::RecordSetComplete(records) = event {
            results = records;
        }
    }

    let status = if results.is_empty() {
        "no results"
    } else {
        "success"
    };
    Json(SearchResponse {
        status: status.to_string(),
        count: results.len(),
        results,
    })
}

/// Detail response
#[derive(Debug, Serialize)]
struct DetailResponse {
    status: String,
    error: Option<String>,
    record: Option<PaperRecord>,
}

/// Single-paper endpoint handler
async fn paper_handler(
    State(ctx): State<Arc<SearchContext>>,
    Path(id): Path<String>,
) -> Json<DetailResponse> {
    info!(id = %id, "detail request");

    let mut events = detail_stream(ctx, id);
    let mut record = None;
    let mut error = None;
    while let Some(event) = events.recv().await {
        match event {
            Event::Record(found) => record = Some(*found),
            Event::DetailError(message) => error = Some(message),
            _ => {}
        }
    }

    let status = if record.is_some() { "success" } else { "error" };
    Json(DetailResponse {
        status: status.to_string(),
        error,
        record,
    })
}
