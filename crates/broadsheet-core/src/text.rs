//! Case-insensitive whole-word text matching.
//!
//! The exact-phrase filter, title boosts, and keyword counting all match on
//! word boundaries: a term or phrase matches only where it is not embedded
//! inside a longer alphanumeric run. Matching is done with plain scans over
//! lowercased text; no regex evaluation over user-provided patterns.

/// Lowercased word tokens: maximal runs of alphanumeric characters and
/// underscores.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `term` occurs in `text` as a whole word.
pub fn contains_whole_word(text: &str, term: &str) -> bool {
    count_whole_word(text, term) > 0
}

/// Case-insensitive whole-word occurrence count of `term` in `text`.
pub fn count_whole_word(text: &str, term: &str) -> u32 {
    let term = term.to_lowercase();
    if term.is_empty() {
        return 0;
    }
    tokenize(text).iter().filter(|t| **t == term).count() as u32
}

/// Whether `phrase` occurs in `haystack` case-insensitively with word
/// boundaries on both ends.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    find_phrase(haystack, phrase).is_some()
}

/// Byte offset (into the lowercased haystack, which equals the original for
/// ASCII) of the first whole-word occurrence of `phrase`.
pub fn find_phrase(haystack: &str, phrase: &str) -> Option<usize> {
    let haystack_lower = haystack.to_lowercase();
    let phrase_lower = phrase.to_lowercase();
    if phrase_lower.is_empty() {
        return None;
    }

    let mut search_from = 0;
    while let Some(relative) = haystack_lower[search_from..].find(&phrase_lower) {
        let start = search_from + relative;
        let end = start + phrase_lower.len();
        let boundary_before = haystack_lower[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let boundary_after = haystack_lower[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if boundary_before && boundary_after {
            return Some(start);
        }
        search_from = start + 1;
    }
    None
}

/// An excerpt of roughly `length` characters. When `anchor` is given the
/// window is centered on it; the window never splits a UTF-8 character and
/// is extended to char boundaries.
pub fn make_excerpt(content: &str, anchor: Option<usize>, length: usize) -> String {
    if content.len() <= length {
        return content.trim().to_string();
    }
    let start = match anchor {
        Some(offset) => offset.saturating_sub(length / 4).min(content.len()),
        None => 0,
    };
    let start = floor_char_boundary(content, start);
    let end = floor_char_boundary(content, (start + length).min(content.len()));
    let mut excerpt = content[start..end].trim().to_string();
    if start > 0 {
        excerpt = format!("…{excerpt}");
    }
    if end < content.len() {
        excerpt.push('…');
    }
    excerpt
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
