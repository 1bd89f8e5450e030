//! Tagged paper identifiers.
//!
//! The two catalogs use incompatible identifier schemes: arXiv ids are
//! versioned numeric-dotted strings ("2301.12345v2"), Semantic Scholar ids
//! are opaque hex strings. [`PaperId`] pairs the native id with its source
//! tag so identically-shaped ids never collide; [`classify`] turns free
//! text (AI output, CLI arguments, URL paths) into a tagged id.
//!
//! Wire/display form is `"arXiv:<id>"` / `"S2:<id>"`. `Unknown` has no
//! usable wire form and must never appear in a finished record id.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Serializer};

/// Wire prefix for preprint-index ids
pub const ARXIV_PREFIX: &str = "arXiv:";

/// Wire prefix for citation-graph ids
pub const SEMANTIC_PREFIX: &str = "S2:";

/// Display form for ids that could not be resolved to any catalog
const UNKNOWN_FORM: &str = "N/A";

/// A source-tagged paper identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaperId {
    /// Preprint-index (arXiv) native id, e.g. "2301.12345v1"
    Arxiv(String),
    /// Citation-graph (Semantic Scholar) native id
    Semantic(String),
    /// Unresolvable token; callers must title-resolve, never accept as-is
    Unknown,
}

impl PaperId {
    /// Whether this id points at a real catalog entry.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arxiv(id) => write!(f, "{ARXIV_PREFIX}{id}"),
            Self::Semantic(id) => write!(f, "{SEMANTIC_PREFIX}{id}"),
            Self::Unknown => f.write_str(UNKNOWN_FORM),
        }
    }
}

impl Serialize for PaperId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Regex for the modern arXiv id shape: 4 digits, dot, 4-5 digits,
/// optional version suffix.
fn arxiv_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static RE_SRC: &str = r"\d{4}\.\d{4,5}(v\d+)?";
    RE.get_or_init(|| Regex::new(RE_SRC).expect("arxiv id regex compiles"))
}

/// Extract the canonical arXiv id from a longer URL-like or versioned string.
///
/// Takes the trailing path segment ("http://arxiv.org/abs/2301.12345v1" ->
/// "2301.12345v1") and matches the leading id pattern inside it. Old-style
/// ids that do not match the modern pattern are returned verbatim.
pub fn parse_arxiv_id(raw: &str) -> String {
    let tail = raw.trim().rsplit('/').next().unwrap_or(raw).trim();
    match arxiv_id_re().find(tail) {
        Some(m) if m.start() == 0 => m.as_str().to_string(),
        _ => tail.to_string(),
    }
}

/// Classify a free-text token into a tagged id.
///
/// `arXiv:`-prefixed or bare pattern-matching tokens become [`PaperId::Arxiv`],
/// `S2:`-prefixed tokens become [`PaperId::Semantic`], everything else is
/// [`PaperId::Unknown`].
pub fn classify(token: &str) -> PaperId {
    let token = token.trim();
    if let Some(rest) = token.strip_prefix(ARXIV_PREFIX) {
        let rest = rest.trim();
        if rest.is_empty() {
            return PaperId::Unknown;
        }
        return PaperId::Arxiv(parse_arxiv_id(rest));
    }
    if let Some(m) = arxiv_id_re().find(token) {
        if m.start() == 0 && m.end() == token.len() {
            return PaperId::Arxiv(token.to_string());
        }
    }
    if let Some(rest) = token.strip_prefix(SEMANTIC_PREFIX) {
        let rest = rest.trim();
        if rest.is_empty() {
            return PaperId::Unknown;
        }
        return PaperId::Semantic(rest.to_string());
    }
    PaperId::Unknown
}
