//! Highlighted excerpts for search results

use regex::{Regex, RegexBuilder};

/// Marker pair and excerpt size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetStyle {
    /// Characters kept on each side of the first match
    pub radius: usize,
    pub open: String,
    pub close: String,
}

impl Default for SnippetStyle {
    fn default() -> Self {
        Self {
            radius: 80,
            open: "<mark>".to_string(),
            close: "</mark>".to_string(),
        }
    }
}

/// Renders excerpts around keyword matches
///
/// Built once per run. Matching is literal and case-insensitive; the stored
/// text may carry diacritics the normalized index did not, in which case no
/// match is found and the excerpt falls back to the start of the text.
#[derive(Debug, Clone)]
pub struct SnippetRenderer {
    pattern: Option<Regex>,
    style: SnippetStyle,
}

impl SnippetRenderer {
    pub fn new(keywords: &[String], style: SnippetStyle) -> Self {
        let mut words: Vec<&str> = keywords
            .iter()
            .flat_map(|k| k.split_whitespace())
            .collect();
        // Longest first so overlapping alternatives prefer the fuller word
        words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        words.dedup();

        let pattern = if words.is_empty() {
            None
        } else {
            let alternation = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join("|");
            match RegexBuilder::new(&alternation).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::debug!("Snippet pattern rejected, highlighting disabled: {}", e);
                    None
                }
            }
        };

        Self { pattern, style }
    }

    pub fn render(&self, text: &str) -> String {
        let first = self.pattern.as_ref().and_then(|re| re.find(text));

        let (start, end) = match first {
            Some(m) => (
                back_chars(text, m.start(), self.style.radius),
                forward_chars(text, m.end(), self.style.radius),
            ),
            None => (0, forward_chars(text, 0, self.style.radius * 2)),
        };

        let mut out = String::with_capacity(end - start + 16);
        if start > 0 {
            out.push('…');
        }
        out.push_str(&self.highlight(&text[start..end]));
        if end < text.len() {
            out.push('…');
        }
        out
    }

    fn highlight(&self, excerpt: &str) -> String {
        let Some(re) = &self.pattern else {
            return excerpt.to_string();
        };

        let mut out = String::with_capacity(excerpt.len() + 32);
        let mut last = 0;
        for m in re.find_iter(excerpt) {
            out.push_str(&excerpt[last..m.start()]);
            out.push_str(&self.style.open);
            out.push_str(m.as_str());
            out.push_str(&self.style.close);
            last = m.end();
        }
        out.push_str(&excerpt[last..]);
        out
    }
}

/// Byte index `n` characters before `from`, clamped to 0
fn back_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Byte index `n` characters after `from`, clamped to the end
fn forward_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(words: &[&str], radius: usize) -> SnippetRenderer {
        let words: Vec<String> = words.iter().map(|s| s.to_string()).collect();
        SnippetRenderer::new(
            &words,
            SnippetStyle {
                radius,
                open: "[".to_string(),
                close: "]".to_string(),
            },
        )
    }

    #[test]
    fn test_highlights_every_occurrence() {
        let r = renderer(&["علم"], 100);
        assert_eq!(r.render("علم ثم علم"), "[علم] ثم [علم]");
    }

    #[test]
    fn test_excerpt_cut_on_char_boundaries() {
        let r = renderer(&["ج"], 2);
        // Arabic letters are two bytes each
        assert_eq!(r.render("ا ب ج د ه"), "…ب [ج] د…");
    }

    #[test]
    fn test_case_insensitive_match() {
        let r = renderer(&["rust"], 10);
        assert_eq!(r.render("I like Rust"), "I like [Rust]");
    }

    #[test]
    fn test_no_match_falls_back_to_head() {
        let r = renderer(&["zzz"], 2);
        assert_eq!(r.render("abcdefgh"), "abcd…");
    }

    #[test]
    fn test_phrase_keywords_split_into_words() {
        let r = renderer(&["كتاب علم"], 50);
        assert_eq!(r.render("علم كتاب"), "[علم] [كتاب]");
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let r = renderer(&["a.b"], 10);
        assert_eq!(r.render("axb a.b"), "axb [a.b]");
    }
}
