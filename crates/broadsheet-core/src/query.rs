//! Power-user query syntax parser.
//!
//! Supported syntax:
//!
//! ```text
//! "exact phrase"        match the phrase verbatim in content
//! title:"phrase"        match the phrase in the title only
//! author:"Name"         filter by author (last occurrence wins)
//! anything else         semantic search terms
//! ```
//!
//! The parser is a single left-to-right scan over the input characters: no
//! regular expressions are evaluated over user-provided text, field names
//! are validated against a whitelist, null bytes are stripped, and both the
//! query and individual phrase bodies have hard length limits. Parsing is
//! pure and total: every input either parses or fails with `QueryTooLong`.

use crate::config::{MAX_PHRASE_LENGTH, MAX_QUERY_LENGTH};
use crate::error::SearchError;
use serde::{Deserialize, Serialize};

/// Parsed query components, echoed back to callers in search responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Unquoted, non-field tokens, in input order
    pub semantic_terms: Vec<String>,
    /// Bare `"..."` phrases, in input order
    pub exact_phrases: Vec<String>,
    /// `title:"..."` phrases, in input order
    pub title_phrases: Vec<String>,
    /// `author:"..."`; the last occurrence wins
    pub author_filter: Option<String>,
}

impl ParsedQuery {
    /// Whether any searchable component survived parsing.
    pub fn has_content(&self) -> bool {
        !self.semantic_terms.is_empty()
            || !self.exact_phrases.is_empty()
            || !self.title_phrases.is_empty()
            || self.author_filter.is_some()
    }

    /// Text handed to the embedding model: the semantic terms joined by
    /// spaces. Empty when the query was quotes/fields only; the engine then
    /// embeds the raw query instead.
    pub fn semantic_query(&self) -> String {
        self.semantic_terms.join(" ")
    }

    /// Reconstructs query syntax that parses back to this value, provided
    /// no phrase body contains a `"`.
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.extend(self.semantic_terms.iter().cloned());
        parts.extend(self.exact_phrases.iter().map(|p| format!("\"{p}\"")));
        parts.extend(self.title_phrases.iter().map(|p| format!("title:\"{p}\"")));
        if let Some(author) = &self.author_filter {
            parts.push(format!("author:\"{author}\""));
        }
        parts.join(" ")
    }
}

/// Parses a raw query string into its components.
pub fn parse_query(query: &str) -> Result<ParsedQuery, SearchError> {
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(SearchError::QueryTooLong {
            max: MAX_QUERY_LENGTH,
        });
    }

    let cleaned: String = query.chars().filter(|&c| c != '\0').collect();
    let chars: Vec<char> = cleaned.chars().collect();

    let mut parsed = ParsedQuery::default();
    let mut pos = 0usize;

    while pos < chars.len() {
        if chars[pos].is_whitespace() {
            pos += 1;
            continue;
        }

        if chars[pos] == '"' {
            match read_phrase(&chars, pos + 1) {
                Some((body, next)) => {
                    if let Some(phrase) = sanitize_phrase(&body) {
                        parsed.exact_phrases.push(phrase);
                    }
                    pos = next;
                }
                // Unterminated quote: drop the quote character and keep
                // scanning; the remaining tokens become plain words
                None => pos += 1,
            }
            continue;
        }

        // Accumulate a word; stop at whitespace or a quote
        let word_start = pos;
        while pos < chars.len() && !chars[pos].is_whitespace() && chars[pos] != '"' {
            pos += 1;
        }
        let word: String = chars[word_start..pos].iter().collect();

        // A word ending in ':' followed directly by a quote is a field
        // phrase candidate
        if pos < chars.len() && chars[pos] == '"' && word.ends_with(':') {
            let field = word[..word.len() - 1].to_ascii_lowercase();
            if field == "title" || field == "author" {
                match read_phrase(&chars, pos + 1) {
                    Some((body, next)) => {
                        if let Some(phrase) = sanitize_phrase(&body) {
                            if field == "title" {
                                parsed.title_phrases.push(phrase);
                            } else {
                                parsed.author_filter = Some(phrase);
                            }
                        }
                        pos = next;
                        continue;
                    }
                    None => {
                        // Unterminated: the field token degrades to a word
                        parsed.semantic_terms.push(word);
                        pos += 1;
                        continue;
                    }
                }
            }
            // Field not in the whitelist: the token stays a literal word and
            // the quoted section is handled on the next iteration as a bare
            // phrase
        }

        if !word.is_empty() {
            parsed.semantic_terms.push(word);
        }
    }

    Ok(parsed)
}

/// Reads a phrase body starting after an opening quote. Returns the body
/// and the position after the closing quote, or `None` when unterminated.
fn read_phrase(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut pos = start;
    while pos < chars.len() {
        if chars[pos] == '"' {
            let body: String = chars[start..pos].iter().collect();
            return Some((body, pos + 1));
        }
        pos += 1;
    }
    None
}

/// Trims and length-caps a phrase body. Empty bodies are discarded.
fn sanitize_phrase(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let capped: String = trimmed.chars().take(MAX_PHRASE_LENGTH).collect();
    let capped = capped.trim_end().to_string();
    if capped.is_empty() {
        None
    } else {
        Some(capped)
    }
}
