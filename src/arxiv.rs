//! arXiv API client (the preprint index).
//!
//! Keyword/title search and id-based fetch over arXiv's Atom feed API.
//! All failures are absorbed: transport errors are retried with backoff,
//! then degrade to an empty result with a logged diagnostic. Callers treat
//! "zero results" identically to "adapter errored".
//!
//! API details:
//! - Endpoint: http://export.arxiv.org/api/query
//! - Max 50 results per query (requests are clamped before being issued)
//! - Atom XML responses; entries missing core fields are skipped

use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::error::{PaperstreamError, Result};
use crate::ident::{parse_arxiv_id, PaperId};
use crate::paper::{squash_whitespace, strip_html, Catalog, PaperRecord, PaperRef};
use crate::resolve::PaperSource;

/// arXiv API base URL
const ARXIV_API_BASE: &str = "http://export.arxiv.org/api/query";

/// Maximum results per query (arXiv page-size ceiling)
const MAX_PER_QUERY: usize = 50;

/// User agent sent with every request
const USER_AGENT: &str = concat!("paperstream/", env!("CARGO_PKG_VERSION"), " (mailto:paperstream@example.com)");

/// One entry parsed out of an Atom feed, before normalization.
#[derive(Debug, Clone, Default)]
pub struct ArxivEntry {
    /// Canonical id, e.g. "2301.12345v1"
    pub id: String,
    /// Abstract-page URL
    pub url: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    /// Primary category term, e.g. "cs.LG"; doubles as the venue
    pub primary_category: String,
}

impl ArxivEntry {
    /// Normalize into the shared record type. Essay and references are
    /// filled later by the pipeline; the record is not emitted until then.
    pub fn into_record(self) -> PaperRecord {
        let venue = if self.primary_category.is_empty() {
            "arXiv".to_string()
        } else {
            self.primary_category
        };
        PaperRecord {
            id: PaperId::Arxiv(self.id),
            url: self.url,
            title: squash_whitespace(&self.title),
            abstract_text: strip_html(&self.summary),
            authors: self.authors,
            year: self.year,
            venue,
            citation_count: 0,
            influential_citation_count: 0,
            references: Vec::new(),
            essay: String::new(),
            source: Catalog::Arxiv,
        }
    }

    fn as_ref_entry(&self) -> PaperRef {
        PaperRef {
            id: PaperId::Arxiv(self.id.clone()),
            title: squash_whitespace(&self.title),
        }
    }
}

/// arXiv API client with retry and limit clamping.
pub struct ArxivClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl ArxivClient {
    pub fn new() -> Self {
        Self::with_base_url(ARXIV_API_BASE)
    }

    /// Point the client at a different endpoint (tests, mirrors).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            max_retries: 3,
        }
    }

    /// Keyword search, relevance-sorted. `limit` is clamped to the arXiv
    /// page-size ceiling before the request is issued.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<ArxivEntry> {
        let query = query.trim();
        if limit == 0 || query.is_empty() {
            return Vec::new();
        }
        let clamped = limit.min(MAX_PER_QUERY);
        let params = [
            ("search_query", format!("all:{query}")),
            ("start", "0".to_string()),
            ("max_results", clamped.to_string()),
            ("sortBy", "relevance".to_string()),
            ("sortOrder", "descending".to_string()),
        ];
        let mut entries = self.fetch_feed(&params).await;
        entries.truncate(clamped);
        entries
    }

    /// Exact title query, best single hit.
    pub async fn search_title(&self, title: &str) -> Option<ArxivEntry> {
        let safe = title.replace('"', "");
        let safe = safe.trim();
        if safe.is_empty() {
            return None;
        }
        let params = [
            ("search_query", format!("ti:\"{safe}\"")),
            ("start", "0".to_string()),
            ("max_results", "1".to_string()),
        ];
        self.fetch_feed(&params).await.into_iter().next()
    }

    /// Fetch a single entry by canonical id.
    pub async fn fetch_by_id(&self, id: &str) -> Option<ArxivEntry> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        let params = [
            ("id_list", id.to_string()),
            ("max_results", "1".to_string()),
        ];
        self.fetch_feed(&params).await.into_iter().next()
    }

    /// Issue one feed request with retry/backoff; transport and parse
    /// failures degrade to an empty list.
    async fn fetch_feed(&self, params: &[(&str, String)]) -> Vec<ArxivEntry> {
        let url = match Url::parse_with_params(&self.base_url, params) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "invalid arXiv query url");
                return Vec::new();
            }
        };

        let mut backoff = Duration::from_millis(500);
        for attempt in 0..self.max_retries {
            match self.try_fetch(url.clone()).await {
                Ok(xml) => match parse_feed(&xml) {
                    Ok(entries) => return entries,
                    Err(e) => {
                        warn!(error = %e, "arXiv feed parse failed");
                        return Vec::new();
                    }
                },
                Err(PaperstreamError::RateLimited(secs)) => {
                    let wait = Duration::from_secs(secs).max(backoff);
                    warn!(attempt = attempt + 1, wait_secs = wait.as_secs(), "arXiv rate limited");
                    tokio::time::sleep(wait).await;
                    backoff *= 2;
                }
                Err(e) => {
                    debug!(attempt = attempt + 1, error = %e, "arXiv request failed");
                    if attempt + 1 < self.max_retries {
                        let jitter = Duration::from_millis(rand::random::<u64>() % 250);
                        tokio::time::sleep(backoff + jitter).await;
                        backoff *= 2;
                    }
                }
            }
        }

        warn!(url = %url, "arXiv request failed after retries");
        Vec::new()
    }

    async fn try_fetch(&self, url: Url) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(PaperstreamError::RateLimited(3));
        }
        if !response.status().is_success() {
            return Err(PaperstreamError::Api {
                code: i32::from(response.status().as_u16()),
                message: format!("arXiv API error: {}", response.status()),
            });
        }
        Ok(response.text().await?)
    }
}

impl Default for ArxivClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaperSource for ArxivClient {
    fn name(&self) -> &str {
        "arXiv"
    }

    async fn search_refs(&self, keywords: &[String], limit: usize) -> Vec<PaperRef> {
        let query = keywords.join(" AND ");
        self.search(&query, limit)
            .await
            .iter()
            .map(ArxivEntry::as_ref_entry)
            .collect()
    }

    async fn find_by_title(&self, title: &str) -> Option<PaperRef> {
        self.search_title(title).await.map(|e| e.as_ref_entry())
    }
}

/// Parse an Atom feed into entries. Entries missing id, title, summary,
/// or authors are skipped; a missing alternate link falls back to the
/// entry's id URL.
fn parse_feed(xml: &str) -> Result<Vec<ArxivEntry>> {
    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut buf = Vec::new();

    let mut in_entry = false;
    let mut in_author = false;
    let mut current_tag = String::new();
    let mut raw_id = String::new();
    let mut title = String::new();
    let mut summary = String::new();
    let mut published = String::new();
    let mut link_abs = String::new();
    let mut category = String::new();
    let mut author_name = String::new();
    let mut authors: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "entry" {
                    in_entry = true;
                    raw_id.clear();
                    title.clear();
                    summary.clear();
                    published.clear();
                    link_abs.clear();
                    category.clear();
                    authors.clear();
                } else if in_entry {
                    current_tag = tag.clone();
                    if tag == "author" {
                        in_author = true;
                        author_name.clear();
                    } else if tag == "link" {
                        capture_abs_link(&e, &mut link_abs);
                    } else if tag.ends_with("primary_category") {
                        capture_category_term(&e, &mut category);
                    }
                }
            }
            Ok(Event::Empty(e)) if in_entry => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "link" {
                    capture_abs_link(&e, &mut link_abs);
                } else if tag.ends_with("primary_category") {
                    capture_category_term(&e, &mut category);
                }
            }
            Ok(Event::Text(e)) if in_entry => {
                let text = e.unescape().unwrap_or_default().to_string();
                match current_tag.as_str() {
                    "title" => title.push_str(&text),
                    "summary" => summary.push_str(&text),
                    "id" if raw_id.is_empty() => raw_id = text,
                    "published" => published.push_str(&text),
                    "name" if in_author => author_name.push_str(&text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "entry" && in_entry {
                    in_entry = false;
                    if let Some(entry) = finish_entry(
                        &raw_id, &title, &summary, &published, &link_abs, &category, &authors,
                    ) {
                        entries.push(entry);
                    }
                } else if tag == "author" && in_author {
                    in_author = false;
                    let name = author_name.trim();
                    if !name.is_empty() {
                        authors.push(name.to_string());
                    }
                }
                if tag == current_tag {
                    current_tag.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(PaperstreamError::Parse(format!("Atom parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn capture_abs_link(e: &quick_xml::events::BytesStart<'_>, link_abs: &mut String) {
    let mut href = String::new();
    let mut rel = String::new();
    let mut title_attr = String::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let val = String::from_utf8_lossy(&attr.value).to_string();
        match key.as_str() {
            "href" => href = val,
            "rel" => rel = val,
            "title" => title_attr = val,
            _ => {}
        }
    }
    if title_attr == "pdf" {
        return;
    }
    if rel == "alternate" || (link_abs.is_empty() && href.contains("/abs/")) {
        *link_abs = href;
    }
}

fn capture_category_term(e: &quick_xml::events::BytesStart<'_>, category: &mut String) {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"term" {
            *category = String::from_utf8_lossy(&attr.value).to_string();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn finish_entry(
    raw_id: &str,
    title: &str,
    summary: &str,
    published: &str,
    link_abs: &str,
    category: &str,
    authors: &[String],
) -> Option<ArxivEntry> {
    let id = parse_arxiv_id(raw_id);
    if id.is_empty()
        || title.trim().is_empty()
        || summary.trim().is_empty()
        || raw_id.trim().is_empty()
        || authors.is_empty()
    {
        debug!(raw_id, "skipping incomplete arXiv entry");
        return None;
    }
    let url = if link_abs.is_empty() {
        raw_id.trim().to_string()
    } else {
        link_abs.to_string()
    };
    let year = chrono::DateTime::parse_from_rfc3339(published.trim())
        .ok()
        .map(|d| d.year())
        .or_else(|| published.get(..4).and_then(|y| y.parse().ok()));
    Some(ArxivEntry {
        id,
        url,
        title: title.trim().to_string(),
        summary: summary.trim().to_string(),
        authors: authors.to_vec(),
        year,
        primary_category: category.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <entry>
    <id>http://arxiv.org/abs/2301.12345v1</id>
    <title>Graph Neural Networks
 for Molecules</title>
    <summary>We study &lt;b&gt;message passing&lt;/b&gt; on molecular graphs.</summary>
    <published>2023-01-15T00:00:00Z</published>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2301.12345v1" rel="alternate" type="text/html"/>
    <link href="http://arxiv.org/pdf/2301.12345v1" title="pdf" type="application/pdf"/>
    <arxiv:primary_category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2302.00001v2</id>
    <title>Entry Without A Summary</title>
    <published>2023-02-01T00:00:00Z</published>
    <author><name>Nobody</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_skips_incomplete_entries() {
        let entries = parse_feed(SAMPLE_FEED).expect("parses");
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.id, "2301.12345v1");
        assert_eq!(e.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(e.year, Some(2023));
        assert_eq!(e.primary_category, "cs.LG");
        assert_eq!(e.url, "http://arxiv.org/abs/2301.12345v1");
    }

    #[test]
    fn test_into_record_normalizes() {
        let entries = parse_feed(SAMPLE_FEED).expect("parses");
        let record = entries[0].clone().into_record();
        assert_eq!(record.id, PaperId::Arxiv("2301.12345v1".to_string()));
        assert_eq!(record.title, "Graph Neural Networks for Molecules");
        assert_eq!(record.abstract_text, "We study message passing on molecular graphs.");
        assert_eq!(record.venue, "cs.LG");
        assert_eq!(record.citation_count, 0);
        assert!(record.references.is_empty());
        assert!(record.essay.is_empty());
        assert_eq!(record.source, Catalog::Arxiv);
    }

    #[test]
    fn test_parse_feed_empty_feed() {
        let entries = parse_feed(r#"<?xml version="1.0"?><feed></feed>"#).expect("parses");
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_search_clamps_and_mock_roundtrip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .match_query(mockito::Matcher::UrlEncoded(
                "max_results".to_string(),
                "50".to_string(),
            ))
            .with_status(200)
            .with_body(SAMPLE_FEED)
            .create_async()
            .await;

        let client = ArxivClient::with_base_url(server.url());
        // A limit above the page-size ceiling is clamped to 50 on the wire
        let entries = client.search("graph neural networks", 200).await;
        mock.assert_async().await;
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_absorbs_server_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(500)
            .expect_at_least(1)
            .create_async()
            .await;

        let client = ArxivClient::with_base_url(server.url());
        assert!(client.search("anything", 4).await.is_empty());
    }

    #[tokio::test]
    async fn test_search_zero_limit_short_circuits() {
        // No server at all: a zero limit must not issue a request
        let client = ArxivClient::with_base_url("http://127.0.0.1:9");
        assert!(client.search("topic", 0).await.is_empty());
        assert!(client.fetch_by_id("").await.is_none());
    }
}
