//! Prompts for abstract analysis and related-paper suggestion.
//!
//! The related-work prompt pins the output to one `<ID>::<Title>` line per
//! suggestion so the parser can recover from partially malformed output
//! line-by-line.

/// Essay prompt template.
/// Placeholders: {abstract}
pub const ESSAY_PROMPT_TEMPLATE: &str = r"Analyze the following research-paper abstract and write an extremely detailed analytical essay:
---
{abstract}
---
Analytical Essay:";

/// Related-papers prompt template.
/// Placeholders: {count}, {abstract}
pub const RELATED_PROMPT_TEMPLATE: &str = r"List {count} research papers closely related to the following abstract. Output each on a new line as <ID>::<Title>. If you know the arXiv ID start with arXiv:ID, if you know the Semantic Scholar paperId start with S2:ID, otherwise write Unknown::Title.
---
{abstract}
---
Lines:";

/// Build the analytical-essay prompt for an abstract.
pub fn build_essay_prompt(abstract_text: &str) -> String {
    ESSAY_PROMPT_TEMPLATE.replace("{abstract}", abstract_text)
}

/// Build the related-papers prompt asking for exactly `count` lines.
pub fn build_related_prompt(abstract_text: &str, count: usize) -> String {
    RELATED_PROMPT_TEMPLATE
        .replace("{count}", &count.to_string())
        .replace("{abstract}", abstract_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_related_prompt_substitutes() {
        let p = build_related_prompt("An abstract.", 4);
        assert!(p.contains("List 4 research papers"));
        assert!(p.contains("An abstract."));
        assert!(!p.contains("{count}"));
        assert!(!p.contains("{abstract}"));
    }

    #[test]
    fn test_build_essay_prompt_substitutes() {
        let p = build_essay_prompt("An abstract.");
        assert!(p.contains("An abstract."));
        assert!(!p.contains("{abstract}"));
    }
}
