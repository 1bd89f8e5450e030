//! Normalized paper records shared by every source adapter.
//!
//! Both catalogs return differently-shaped entries; the adapters convert
//! them into the single [`PaperRecord`] type defined here. A record is
//! fully assembled (abstract cleaned, essay and references filled) before
//! it is handed to a consumer and is immutable afterward.

use serde::Serialize;
use std::sync::OnceLock;

use regex::Regex;

use crate::ident::PaperId;

/// Which adapter produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Catalog {
    /// The preprint index (arXiv)
    Arxiv,
    /// The citation graph (Semantic Scholar)
    SemanticScholar,
}

impl Catalog {
    /// Human-readable catalog name, as shown in progress messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Arxiv => "arXiv",
            Self::SemanticScholar => "Semantic Scholar",
        }
    }
}

/// Minimal reference to a paper, used for related-work listings
/// before full hydration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaperRef {
    /// Tagged identifier (wire form when serialized)
    pub id: PaperId,
    /// Paper title
    pub title: String,
}

impl PaperRef {
    /// Sentinel entry meaning "no related papers found" - not a real
    /// reference, and never mixed with real ones.
    pub fn none_found() -> Self {
        Self {
            id: PaperId::Unknown,
            title: "No related papers found".to_string(),
        }
    }
}

/// The hydrated paper entity emitted on the event stream.
#[derive(Debug, Clone, Serialize)]
pub struct PaperRecord {
    /// Canonical tagged identifier; never `Unknown`
    pub id: PaperId,
    /// Landing-page URL
    pub url: String,
    /// Title, whitespace-squashed
    pub title: String,
    /// Plain-text abstract, HTML stripped
    pub abstract_text: String,
    /// Ordered author names
    pub authors: Vec<String>,
    /// Publication year, when the source reports one
    pub year: Option<i32>,
    /// Venue, defaulted per source
    pub venue: String,
    /// Citation count; absent upstream values coerce to 0
    pub citation_count: u32,
    /// Influential citation count; absent upstream values coerce to 0
    pub influential_citation_count: u32,
    /// Related-work list, at most [`crate::resolve::RELATED_LIMIT`] entries
    pub references: Vec<PaperRef>,
    /// AI-generated analytical text: empty = not attempted,
    /// marker string = attempted and failed
    pub essay: String,
    /// Which adapter produced this record
    pub source: Catalog,
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag regex compiles"))
}

/// Strip HTML tags and unescape the handful of entities that show up in
/// upstream abstracts, then trim.
pub fn strip_html(text: &str) -> String {
    let stripped = tag_re().replace_all(text, "");
    stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}

/// Collapse internal newlines and runs of whitespace to single spaces.
/// Upstream titles arrive line-wrapped.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
