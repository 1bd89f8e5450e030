//! Semantic Scholar API client (the citation graph).
//!
//! Keyword/title search and id-based fetch against the Graph API. The
//! client requires a credential; when none is configured the client is
//! simply never constructed and calling code skips this catalog.
//!
//! API details:
//! - Base: https://api.semanticscholar.org/graph/v1
//! - Max 100 results per query (requests are clamped before being issued)
//! - `x-api-key` header on every request
//!
//! Failure semantics match the other adapter: retry with backoff, then
//! degrade to empty results with a logged diagnostic.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{PaperstreamError, Result};
use crate::ident::PaperId;
use crate::paper::{squash_whitespace, strip_html, Catalog, PaperRecord, PaperRef};
use crate::resolve::PaperSource;

/// Semantic Scholar Graph API base URL
const S2_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Maximum results per query (API page-size ceiling)
const MAX_PER_QUERY: usize = 100;

/// Fields requested for every paper payload
const PAPER_FIELDS: &str =
    "paperId,url,title,abstract,authors,year,venue,citationCount,influentialCitationCount";

/// User agent sent with every request
const USER_AGENT: &str = concat!("paperstream/", env!("CARGO_PKG_VERSION"), " (mailto:paperstream@example.com)");

/// One validated paper from the citation graph.
#[derive(Debug, Clone)]
pub struct SemanticPaper {
    pub paper_id: String,
    pub url: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: String,
    pub citation_count: u32,
    pub influential_citation_count: u32,
}

impl SemanticPaper {
    /// Normalize into the shared record type. Essay and references are
    /// filled later by the pipeline.
    pub fn into_record(self) -> PaperRecord {
        let venue = if self.venue.is_empty() {
            "Semantic Scholar".to_string()
        } else {
            self.venue
        };
        PaperRecord {
            id: PaperId::Semantic(self.paper_id),
            url: self.url,
            title: squash_whitespace(&self.title),
            abstract_text: strip_html(&self.abstract_text),
            authors: self.authors,
            year: self.year,
            venue,
            citation_count: self.citation_count,
            influential_citation_count: self.influential_citation_count,
            references: Vec::new(),
            essay: String::new(),
            source: Catalog::SemanticScholar,
        }
    }

    fn as_ref_entry(&self) -> PaperRef {
        PaperRef {
            id: PaperId::Semantic(self.paper_id.clone()),
            title: squash_whitespace(&self.title),
        }
    }
}

// === Raw API payloads ===

#[derive(Debug, Deserialize)]
struct S2SearchResponse {
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
struct S2Paper {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    url: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    year: Option<i32>,
    venue: Option<String>,
    #[serde(rename = "citationCount")]
    citation_count: Option<i64>,
    #[serde(rename = "influentialCitationCount")]
    influential_citation_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

/// Drop entries missing paperId or title; coerce absent counts to 0.
fn normalize(paper: S2Paper) -> Option<SemanticPaper> {
    let paper_id = paper.paper_id.filter(|s| !s.trim().is_empty())?;
    let title = paper.title.filter(|s| !s.trim().is_empty())?;
    Some(SemanticPaper {
        paper_id,
        url: paper.url.unwrap_or_default(),
        title,
        abstract_text: paper.abstract_text.unwrap_or_default(),
        authors: paper
            .authors
            .into_iter()
            .filter_map(|a| a.name)
            .filter(|n| !n.trim().is_empty())
            .collect(),
        year: paper.year,
        venue: paper.venue.unwrap_or_default().trim().to_string(),
        citation_count: u32::try_from(paper.citation_count.unwrap_or(0).max(0)).unwrap_or(0),
        influential_citation_count: u32::try_from(
            paper.influential_citation_count.unwrap_or(0).max(0),
        )
        .unwrap_or(0),
    })
}

/// Citation-graph client. Construction requires the API credential.
pub struct SemanticClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl SemanticClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, S2_API_BASE)
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            max_retries: 3,
        }
    }

    /// Keyword search. `limit` is clamped to the API page-size ceiling
    /// before the request is issued; invalid entries are dropped.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SemanticPaper> {
        let query = query.trim();
        if limit == 0 || query.is_empty() {
            return Vec::new();
        }
        let clamped = limit.min(MAX_PER_QUERY);
        let url = format!("{}/paper/search", self.base_url);
        let params = [
            ("query", query.to_string()),
            ("limit", clamped.to_string()),
            ("fields", PAPER_FIELDS.to_string()),
        ];
        match self.get_with_retry::<S2SearchResponse>(&url, &params).await {
            Ok(response) => response
                .data
                .into_iter()
                .filter_map(normalize)
                .take(clamped)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Semantic Scholar search failed");
                Vec::new()
            }
        }
    }

    /// Fetch a single paper by native id.
    pub async fn fetch(&self, paper_id: &str) -> Option<SemanticPaper> {
        let paper_id = paper_id.trim();
        if paper_id.is_empty() {
            return None;
        }
        let url = format!(
            "{}/paper/{}",
            self.base_url,
            urlencoding::encode(paper_id)
        );
        let params = [("fields", PAPER_FIELDS.to_string())];
        match self.get_with_retry::<S2Paper>(&url, &params).await {
            Ok(paper) => normalize(paper),
            Err(e) => {
                warn!(paper_id, error = %e, "Semantic Scholar fetch failed");
                None
            }
        }
    }

    /// Best single hit for a title query.
    pub async fn best_title_match(&self, title: &str) -> Option<PaperRef> {
        self.search(title, 1).await.first().map(SemanticPaper::as_ref_entry)
    }

    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let mut backoff = Duration::from_millis(500);
        let mut last_err = PaperstreamError::NoResults;
        for attempt in 0..self.max_retries {
            match self.get_json::<T>(url, params).await {
                Ok(value) => return Ok(value),
                Err(PaperstreamError::RateLimited(secs)) => {
                    let wait = Duration::from_secs(secs).max(backoff);
                    warn!(attempt = attempt + 1, wait_secs = wait.as_secs(), "Semantic Scholar rate limited");
                    tokio::time::sleep(wait).await;
                    backoff *= 2;
                    last_err = PaperstreamError::RateLimited(secs);
                }
                Err(e) => {
                    debug!(attempt = attempt + 1, error = %e, "Semantic Scholar request failed");
                    last_err = e;
                    if attempt + 1 < self.max_retries {
                        let jitter = Duration::from_millis(rand::random::<u64>() % 250);
                        tokio::time::sleep(backoff + jitter).await;
                        backoff *= 2;
                    }
                }
            }
        }
        Err(last_err)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(&str, String)]) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(params)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PaperstreamError::RateLimited(5));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaperstreamError::Api {
                code: i32::from(status.as_u16()),
                message: format!("Semantic Scholar API error: {status} - {body}"),
            });
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl PaperSource for SemanticClient {
    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    async fn search_refs(&self, keywords: &[String], limit: usize) -> Vec<PaperRef> {
        let query = keywords.join(" ");
        self.search(&query, limit)
            .await
            .iter()
            .map(SemanticPaper::as_ref_entry)
            .collect()
    }

    async fn find_by_title(&self, title: &str) -> Option<PaperRef> {
        self.best_title_match(title).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(paper_id: Option<&str>, title: Option<&str>) -> S2Paper {
        S2Paper {
            paper_id: paper_id.map(String::from),
            url: Some("https://example.org/p".to_string()),
            title: title.map(String::from),
            abstract_text: None,
            authors: vec![
                S2Author { name: Some("Grace Hopper".to_string()) },
                S2Author { name: None },
            ],
            year: Some(2021),
            venue: Some("  NeurIPS ".to_string()),
            citation_count: None,
            influential_citation_count: Some(-3),
        }
    }

    #[test]
    fn test_normalize_requires_id_and_title() {
        assert!(normalize(raw(None, Some("T"))).is_none());
        assert!(normalize(raw(Some("abc"), None)).is_none());
        assert!(normalize(raw(Some("  "), Some("T"))).is_none());
        assert!(normalize(raw(Some("abc"), Some("T"))).is_some());
    }

    #[test]
    fn test_normalize_coerces_counts_and_trims_venue() {
        let p = normalize(raw(Some("abc"), Some("T"))).expect("valid");
        assert_eq!(p.citation_count, 0);
        assert_eq!(p.influential_citation_count, 0);
        assert_eq!(p.venue, "NeurIPS");
        assert_eq!(p.authors, vec!["Grace Hopper"]);
    }

    #[test]
    fn test_into_record_defaults_venue() {
        let mut p = normalize(raw(Some("abc"), Some("T"))).expect("valid");
        p.venue = String::new();
        let record = p.into_record();
        assert_eq!(record.venue, "Semantic Scholar");
        assert_eq!(record.id, PaperId::Semantic("abc".to_string()));
        assert_eq!(record.source, Catalog::SemanticScholar);
    }

    #[tokio::test]
    async fn test_search_sends_credential_and_clamps() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/paper/search")
            .match_header("x-api-key", "test-key")
            .match_query(mockito::Matcher::UrlEncoded(
                "limit".to_string(),
                "100".to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{"data": [{"paperId": "p1", "title": "One"}, {"title": "Missing id"}]}"#,
            )
            .create_async()
            .await;

        let client = SemanticClient::with_base_url("test-key", server.url());
        let papers = client.search("graph neural networks", 500).await;
        mock.assert_async().await;
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].paper_id, "p1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_absorbs_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/paper/.*".to_string()))
            .with_status(500)
            .expect_at_least(1)
            .create_async()
            .await;

        let client = SemanticClient::with_base_url("test-key", server.url());
        assert!(client.fetch("abc123").await.is_none());
    }
}
