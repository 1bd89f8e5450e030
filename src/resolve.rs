//! Fallback resolution of related-work references.
//!
//! Guarantees up to [`RELATED_LIMIT`] source-backed references for an
//! abstract/title pair, using the cheapest reliable step first and
//! escalating only on shortfall:
//!
//! 1. AI suggestions, with `Unknown` ids resolved by title lookup
//! 2. citation-graph keyword search over the abstract
//! 3. preprint-index keyword search over the abstract
//! 4. both again over the title
//! 5. a single sentinel entry when everything came up empty
//!
//! References are deduplicated by canonical id in discovery order and the
//! final list is truncated to the limit.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::ident::PaperId;
use crate::paper::PaperRef;
use crate::suggest::{parse_suggestions, SuggestionEngine};

/// Maximum related-work references per record (K)
pub const RELATED_LIMIT: usize = 4;

/// Maximum keywords extracted from a text for fallback queries
pub const KEYWORD_LIMIT: usize = 10;

const STOP_WORDS: &[&str] = &[
    "the", "and", "of", "to", "in", "a", "for", "on", "with", "an", "by", "is", "that", "this",
    "we", "at", "as", "from", "be", "are", "it", "or",
];

/// Extract up to [`KEYWORD_LIMIT`] stop-word-filtered keywords from a text.
pub fn keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w) && w.len() > 2)
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()).to_string())
        .filter(|w| !w.is_empty())
        .take(KEYWORD_LIMIT)
        .collect()
}

/// The search surface both adapters expose to the resolver.
///
/// Implementations format their own query from the keyword list (the two
/// catalogs join terms differently) and absorb their own failures.
#[async_trait]
pub trait PaperSource: Send + Sync {
    fn name(&self) -> &str;

    /// Keyword search returning cheap references; empty on failure.
    async fn search_refs(&self, keywords: &[String], limit: usize) -> Vec<PaperRef>;

    /// Best single hit for a title query; `None` on failure.
    async fn find_by_title(&self, title: &str) -> Option<PaperRef>;
}

/// Resolver over the suggestion engine and the two catalogs. The
/// citation-graph source is absent when no credential is configured;
/// every step involving it is then skipped.
pub struct RelatedResolver<'a> {
    engine: &'a SuggestionEngine,
    citation: Option<&'a dyn PaperSource>,
    preprint: &'a dyn PaperSource,
}

impl<'a> RelatedResolver<'a> {
    pub fn new(
        engine: &'a SuggestionEngine,
        citation: Option<&'a dyn PaperSource>,
        preprint: &'a dyn PaperSource,
    ) -> Self {
        Self {
            engine,
            citation,
            preprint,
        }
    }

    /// Resolve up to [`RELATED_LIMIT`] references for an abstract/title
    /// pair. Never empty: a complete miss yields the single sentinel entry.
    pub async fn resolve(&self, abstract_text: &str, title: &str) -> Vec<PaperRef> {
        let mut refs: Vec<PaperRef> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        self.collect_ai_suggestions(abstract_text, &mut refs, &mut seen)
            .await;

        for source_text in [abstract_text, title] {
            if refs.len() >= RELATED_LIMIT {
                break;
            }
            self.pad_from_keywords(source_text, &mut refs, &mut seen)
                .await;
        }

        if refs.is_empty() {
            return vec![PaperRef::none_found()];
        }
        refs.truncate(RELATED_LIMIT);
        refs
    }

    /// Step 1: AI suggestions. Directly-classified ids are kept as-is
    /// (trusted without a verification round-trip); `Unknown` ids are
    /// title-resolved and dropped silently when resolution fails.
    async fn collect_ai_suggestions(
        &self,
        abstract_text: &str,
        refs: &mut Vec<PaperRef>,
        seen: &mut HashSet<String>,
    ) {
        let Some(raw) = self.engine.related_lines(abstract_text, RELATED_LIMIT).await else {
            return;
        };
        for suggestion in parse_suggestions(&raw) {
            if refs.len() >= RELATED_LIMIT {
                break;
            }
            match suggestion.id {
                PaperId::Unknown => {
                    let lookup = format!("{} {}", suggestion.raw_id, suggestion.title);
                    match self.resolve_title(lookup.trim()).await {
                        Some(reference) => push_unique(refs, seen, reference),
                        None => {
                            debug!(title = %suggestion.title, "dropping unresolvable suggestion")
                        }
                    }
                }
                id => push_unique(
                    refs,
                    seen,
                    PaperRef {
                        id,
                        title: suggestion.title,
                    },
                ),
            }
        }
    }

    /// Title resolution for an `Unknown` suggestion: citation graph first
    /// when credentialed, then an exact preprint-index title query.
    async fn resolve_title(&self, title: &str) -> Option<PaperRef> {
        if title.is_empty() {
            return None;
        }
        if let Some(citation) = self.citation {
            if let Some(reference) = citation.find_by_title(title).await {
                return Some(reference);
            }
        }
        self.preprint.find_by_title(title).await
    }

    /// Steps 2-3 (or 4): pad the shortfall from keyword searches, citation
    /// graph before preprint index. Zero extractable keywords short-circuits
    /// without touching either adapter.
    async fn pad_from_keywords(
        &self,
        text: &str,
        refs: &mut Vec<PaperRef>,
        seen: &mut HashSet<String>,
    ) {
        let words = keywords(text);
        if words.is_empty() {
            return;
        }
        let ordered: [Option<&dyn PaperSource>; 2] = [self.citation, Some(self.preprint)];
        for source in ordered.into_iter().flatten() {
            if refs.len() >= RELATED_LIMIT {
                break;
            }
            let shortfall = RELATED_LIMIT - refs.len();
            for reference in source.search_refs(&words, shortfall).await {
                push_unique(refs, seen, reference);
            }
        }
    }
}

/// Append a reference unless its canonical id was already collected or the
/// limit is reached. First occurrence wins.
fn push_unique(refs: &mut Vec<PaperRef>, seen: &mut HashSet<String>, candidate: PaperRef) {
    if refs.len() >= RELATED_LIMIT {
        return;
    }
    if seen.insert(candidate.id.to_string()) {
        refs.push(candidate);
    }
}
