//! FTS5 match-expression building

use serde::{Deserialize, Serialize};

/// Full-text match mode
///
/// Controls how the keyword list is combined before being sent to FTS5.
///
/// ```text
/// ["كتاب", "علم"]
///   Phrase   → "كتاب علم"           (contiguous, in order)
///   Contains → كتاب AND علم         (all terms, any order)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Keywords joined and matched as one quoted phrase
    #[default]
    Phrase,

    /// Every keyword must appear, position and order independent
    Contains,
}

impl MatchMode {
    /// Build the MATCH expression for already-normalized keywords
    ///
    /// # Modes
    /// - **Phrase**: join with spaces, escape internal quotes, wrap in quotes
    /// - **Contains**: join terms with ` AND `; a term carrying FTS syntax
    ///   characters is quoted so it stays a single term
    pub fn build(self, keywords: &[String]) -> String {
        match self {
            MatchMode::Phrase => quote(&keywords.join(" ")),
            MatchMode::Contains => keywords
                .iter()
                .map(|k| if is_bare_term(k) { k.clone() } else { quote(k) })
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Phrase => "phrase",
            MatchMode::Contains => "contains",
        }
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Letters, digits, `_` and combining marks (Arabic diacritics) are safe bare.
/// Upper-case boolean keywords would be read as operators, so they are not.
fn is_bare_term(term: &str) -> bool {
    let plain = term
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || is_combining_mark(c));
    plain && !matches!(term, "AND" | "OR" | "NOT" | "NEAR")
}

fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{0610}'..='\u{061A}' | '\u{064B}'..='\u{065F}' | '\u{0670}')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_phrase_wraps_joined_keywords() {
        let expr = MatchMode::Phrase.build(&kw(&["كتاب", "علم"]));
        assert_eq!(expr, "\"كتاب علم\"");
    }

    #[test]
    fn test_phrase_escapes_quotes() {
        let expr = MatchMode::Phrase.build(&kw(&["say", "\"hi\""]));
        assert_eq!(expr, "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_contains_joins_with_and() {
        let expr = MatchMode::Contains.build(&kw(&["كتاب", "علم"]));
        assert_eq!(expr, "كتاب AND علم");
    }

    #[test]
    fn test_contains_quotes_syntax_terms() {
        let expr = MatchMode::Contains.build(&kw(&["a-b", "NOT", "c*"]));
        assert_eq!(expr, "\"a-b\" AND \"NOT\" AND \"c*\"");
    }

    #[test]
    fn test_contains_keeps_diacritics_bare() {
        let expr = MatchMode::Contains.build(&kw(&["عِلْم"]));
        assert_eq!(expr, "عِلْم");
    }
}
