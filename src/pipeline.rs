//! Aggregation pipeline and event stream.
//!
//! Drives one topic search (or one detail fetch) across both catalogs and
//! emits progress as an ordered stream of [`Event`]s over a bounded
//! channel. Each request runs on its own task; the only state shared with
//! other requests is the read-only [`SearchContext`]. A consumer that
//! stops reading closes the channel, the next send fails, and the
//! producer task winds down - an abandoned request can never stall a new
//! one.
//!
//! Within one request events are strictly ordered: a status before the
//! work, a status before each hit, a record after each hit, the complete
//! record set, a closing status, then the terminal event. Records are
//! fully assembled (abstract cleaned, essay and references filled) before
//! emission and immutable afterward.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::arxiv::ArxivClient;
use crate::config::Credentials;
use crate::ident::{classify, PaperId};
use crate::paper::PaperRecord;
use crate::resolve::{PaperSource, RelatedResolver};
use crate::semantic::SemanticClient;
use crate::suggest::{GenTextClient, SuggestionEngine};

/// Fixed pause after each hit's processing, respecting the collaborating
/// services' usage policies. A hard per-hit serialization point.
pub const PACING_DELAY: Duration = Duration::from_millis(1100);

/// Event channel capacity. Bounded so a slow consumer applies backpressure
/// instead of letting a request buffer unboundedly.
const CHANNEL_CAPACITY: usize = 32;

/// Progress and result messages for one request, in emission order.
#[derive(Debug, Clone)]
pub enum Event {
    /// Human-readable progress message
    Status(String),
    /// One fully assembled record
    Record(Box<PaperRecord>),
    /// Every record of a topic search, emitted once after the last hit
    RecordSetComplete(Vec<PaperRecord>),
    /// Terminal failure of a detail fetch
    DetailError(String),
    /// Terminal event with the final record count; nothing follows it
    Done(usize),
}

/// Read-only context shared by all requests: the two adapters and the
/// suggestion engine, built once at startup from resolved credentials.
pub struct SearchContext {
    pub arxiv: ArxivClient,
    /// Absent when no citation-graph credential is configured
    pub semantic: Option<SemanticClient>,
    pub engine: SuggestionEngine,
    /// Per-hit pacing; [`PACING_DELAY`] outside tests
    pub pacing: Duration,
}

impl SearchContext {
    pub fn new(credentials: Credentials) -> Self {
        let semantic = credentials.semantic_api_key.map(SemanticClient::new);
        let engine = match credentials.llm {
            Some(llm) => SuggestionEngine::new(Box::new(GenTextClient::new(llm))),
            None => SuggestionEngine::unconfigured(),
        };
        Self {
            arxiv: ArxivClient::new(),
            semantic,
            engine,
            pacing: PACING_DELAY,
        }
    }

    fn resolver(&self) -> RelatedResolver<'_> {
        RelatedResolver::new(
            &self.engine,
            self.semantic.as_ref().map(|s| s as &dyn PaperSource),
            &self.arxiv,
        )
    }

    /// Fill essay and references; called exactly once per record, before
    /// emission.
    async fn hydrate(&self, record: &mut PaperRecord) {
        record.essay = self.engine.essay(&record.abstract_text).await;
        record.references = self
            .resolver()
            .resolve(&record.abstract_text, &record.title)
            .await;
    }
}

/// Start a topic search on its own task and return the event stream.
pub fn search_stream(
    ctx: Arc<SearchContext>,
    topic: String,
    count: usize,
) -> mpsc::Receiver<Event> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        run_search(ctx, topic, count, tx).await;
    });
    rx
}

/// Start a single-id detail fetch on its own task and return the event
/// stream.
pub fn detail_stream(ctx: Arc<SearchContext>, id: String) -> mpsc::Receiver<Event> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        run_detail(ctx, id, tx).await;
    });
    rx
}

/// Send one event; a closed channel means the consumer is gone and the
/// request should wind down.
async fn send(tx: &mpsc::Sender<Event>, event: Event) -> bool {
    if tx.send(event).await.is_err() {
        debug!("consumer gone, aborting request");
        return false;
    }
    true
}

async fn run_search(ctx: Arc<SearchContext>, topic: String, count: usize, tx: mpsc::Sender<Event>) {
    info!(topic = %topic, count, "starting topic search");
    if !send(&tx, Event::Status(format!("Searching \"{topic}\"..."))).await {
        return;
    }

    // Split the requested count: half from the citation graph when it is
    // credentialed, the remainder (or everything) from the preprint index.
    let want_semantic = if ctx.semantic.is_some() { count / 2 } else { 0 };
    let semantic_hits = match &ctx.semantic {
        Some(s2) if want_semantic > 0 => s2.search(&topic, want_semantic).await,
        _ => Vec::new(),
    };
    let want_arxiv = count.saturating_sub(semantic_hits.len());
    let arxiv_hits = ctx.arxiv.search(&topic, want_arxiv).await;

    let total = arxiv_hits.len() + semantic_hits.len();
    if total == 0 {
        info!(topic = %topic, "no results from either catalog");
        if !send(&tx, Event::Status("No papers found".to_string())).await {
            return;
        }
        if !send(&tx, Event::RecordSetComplete(Vec::new())).await {
            return;
        }
        send(&tx, Event::Done(0)).await;
        return;
    }

    let mut records: Vec<PaperRecord> = Vec::new();
    let mut done = 0usize;

    let base_records = arxiv_hits
        .into_iter()
        .map(|entry| entry.into_record())
        .chain(semantic_hits.into_iter().map(|paper| paper.into_record()));

    for mut record in base_records {
        done += 1;
        let label = record.source.label();
        if !send(&tx, Event::Status(format!("Processing {done}/{total} ({label})"))).await {
            return;
        }
        ctx.hydrate(&mut record).await;
        if !send(&tx, Event::Record(Box::new(record.clone()))).await {
            return;
        }
        records.push(record);
        tokio::time::sleep(ctx.pacing).await;
    }

    let final_count = records.len();
    if !send(&tx, Event::RecordSetComplete(records)).await {
        return;
    }
    if !send(
        &tx,
        Event::Status(format!("Analysis complete ({final_count} papers)")),
    )
    .await
    {
        return;
    }
    send(&tx, Event::Done(final_count)).await;
    info!(count = final_count, "topic search complete");
}

async fn run_detail(ctx: Arc<SearchContext>, raw_id: String, tx: mpsc::Sender<Event>) {
    let raw_id = raw_id.trim().to_string();
    if raw_id.is_empty() {
        send(&tx, Event::DetailError("Invalid paper id".to_string())).await;
        return;
    }
    info!(id = %raw_id, "starting detail fetch");
    if !send(&tx, Event::Status(format!("Fetching {raw_id}..."))).await {
        return;
    }

    let record = match classify(&raw_id) {
        PaperId::Arxiv(id) => ctx.arxiv.fetch_by_id(&id).await.map(|e| e.into_record()),
        PaperId::Semantic(id) => match &ctx.semantic {
            Some(s2) => s2.fetch(&id).await.map(|p| p.into_record()),
            None => {
                send(
                    &tx,
                    Event::DetailError(format!(
                        "{} credential missing, cannot fetch {raw_id}",
                        crate::config::SEMANTIC_KEY_ENV
                    )),
                )
                .await;
                return;
            }
        },
        PaperId::Unknown => {
            send(
                &tx,
                Event::DetailError(format!("Unrecognized paper id: {raw_id}")),
            )
            .await;
            return;
        }
    };

    match record {
        Some(mut record) => {
            ctx.hydrate(&mut record).await;
            if !send(&tx, Event::Record(Box::new(record))).await {
                return;
            }
            if !send(&tx, Event::Status(format!("Details ready for {raw_id}"))).await {
                return;
            }
            send(&tx, Event::Done(1)).await;
        }
        None => {
            send(
                &tx,
                Event::DetailError(format!("Details not found for {raw_id}")),
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::suggest::TextGenerator;
    use async_trait::async_trait;

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// Build an Atom feed of `n` valid entries whose titles and abstracts
    /// contain only stop words, so related-work fallback never issues
    /// extra requests during pipeline tests.
    fn stop_word_feed(n: usize) -> String {
        let entries: String = (1..=n)
            .map(|i| {
                format!(
                    r#"<entry>
  <id>http://arxiv.org/abs/230{i}.0000{i}v1</id>
  <title>The And Of It</title>
  <summary>the of and to in for on</summary>
  <published>2023-01-0{i}T00:00:00Z</published>
  <author><name>Author {i}</name></author>
  <link href="http://arxiv.org/abs/230{i}.0000{i}v1" rel="alternate" type="text/html"/>
  <arxiv:primary_category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
</entry>"#
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">{entries}</feed>"#
        )
    }

    fn test_context(arxiv: ArxivClient, semantic: Option<SemanticClient>) -> SearchContext {
        SearchContext {
            arxiv,
            semantic,
            engine: SuggestionEngine::unconfigured(),
            pacing: Duration::ZERO,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_search_without_credential_uses_preprint_only() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("max_results".to_string(), "4".to_string()),
                mockito::Matcher::UrlEncoded(
                    "search_query".to_string(),
                    "all:graph neural networks".to_string(),
                ),
            ]))
            .with_status(200)
            .with_body(stop_word_feed(4))
            .expect(1)
            .create_async()
            .await;

        let ctx = Arc::new(test_context(
            ArxivClient::with_base_url(server.url()),
            None,
        ));
        let events = drain(search_stream(ctx, "graph neural networks".to_string(), 4)).await;
        mock.assert_async().await;

        assert!(matches!(events.first(), Some(Event::Status(_))));
        assert!(matches!(events.last(), Some(Event::Done(4))));
        let record_count = events
            .iter()
            .filter(|e| matches!(e, Event::Record(_)))
            .count();
        assert_eq!(record_count, 4);
        // Each record is immediately preceded by its status
        for (idx, event) in events.iter().enumerate() {
            if matches!(event, Event::Record(_)) {
                assert!(matches!(events[idx - 1], Event::Status(_)));
            }
        }
        let complete: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::RecordSetComplete(records) => Some(records.len()),
                _ => None,
            })
            .collect();
        assert_eq!(complete, vec![4]);
        let terminal_count = events
            .iter()
            .filter(|e| matches!(e, Event::Done(_)))
            .count();
        assert_eq!(terminal_count, 1);
    }

    #[tokio::test]
    async fn test_search_no_results_ends_cleanly() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"></feed>"#)
            .create_async()
            .await;

        let ctx = Arc::new(test_context(
            ArxivClient::with_base_url(server.url()),
            None,
        ));
        let events = drain(search_stream(ctx, "no such topic".to_string(), 4)).await;

        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Status(s) if s == "No papers found")));
        assert!(matches!(
            events.iter().rev().nth(1),
            Some(Event::RecordSetComplete(records)) if records.is_empty()
        ));
        assert!(matches!(events.last(), Some(Event::Done(0))));
        assert!(!events.iter().any(|e| matches!(e, Event::Record(_))));
    }

    #[tokio::test]
    async fn test_search_hydrates_essay_and_sentinel_references() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body(stop_word_feed(1))
            .create_async()
            .await;

        let ctx = Arc::new(SearchContext {
            arxiv: ArxivClient::with_base_url(server.url()),
            semantic: None,
            engine: SuggestionEngine::new(Box::new(FixedGenerator("A close reading."))),
            pacing: Duration::ZERO,
        });
        let events = drain(search_stream(ctx, "anything".to_string(), 1)).await;

        let record = events
            .iter()
            .find_map(|e| match e {
                Event::Record(record) => Some(record.clone()),
                _ => None,
            })
            .expect("one record emitted");
        assert_eq!(record.essay, "A close reading.");
        // Stop-word abstract and title: the resolver found nothing and
        // fell back to the sentinel
        assert_eq!(record.references, vec![crate::paper::PaperRef::none_found()]);
        assert!(record.id.is_known());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_fetch_http_error_emits_single_detail_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/paper/.*".to_string()))
            .with_status(500)
            .expect_at_least(1)
            .create_async()
            .await;

        let ctx = Arc::new(test_context(
            ArxivClient::with_base_url("http://127.0.0.1:9"),
            Some(SemanticClient::with_base_url("key", server.url())),
        ));
        let events = drain(detail_stream(ctx, "S2:abc123".to_string())).await;

        let errors = events
            .iter()
            .filter(|e| matches!(e, Event::DetailError(_)))
            .count();
        assert_eq!(errors, 1);
        assert!(!events.iter().any(|e| matches!(e, Event::Record(_))));
    }

    #[tokio::test]
    async fn test_detail_fetch_semantic_without_credential_errors() {
        let ctx = Arc::new(test_context(
            ArxivClient::with_base_url("http://127.0.0.1:9"),
            None,
        ));
        let events = drain(detail_stream(ctx, "S2:abc123".to_string())).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::DetailError(msg) if msg.contains("credential missing"))));
        assert!(!events.iter().any(|e| matches!(e, Event::Record(_))));
    }

    #[tokio::test]
    async fn test_detail_fetch_unknown_id_errors() {
        let ctx = Arc::new(test_context(
            ArxivClient::with_base_url("http://127.0.0.1:9"),
            None,
        ));
        let events = drain(detail_stream(ctx, "DOI:10.1234/whatever".to_string())).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::DetailError(msg) if msg.contains("Unrecognized"))));
    }

    #[tokio::test]
    async fn test_abandoned_consumer_stops_producer() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body(stop_word_feed(4))
            .create_async()
            .await;

        let ctx = Arc::new(test_context(
            ArxivClient::with_base_url(server.url()),
            None,
        ));
        let mut rx = search_stream(ctx, "anything".to_string(), 4);
        // Read one event, then walk away
        let first = rx.recv().await;
        assert!(first.is_some());
        drop(rx);
        // The producer notices the closed channel on its next send and
        // returns; nothing to assert beyond not hanging.
        tokio::task::yield_now().await;
    }
}
