//! Article chunking for long documents.
//!
//! Articles longer than the configured word threshold are split into
//! overlapping windows before indexing. Boundaries are computed on the word
//! grid (a chunk never cuts a word) and chunk ends are snapped to the
//! nearest section marker (blank line, newline) within a bounded search
//! window so chunks end on paragraph boundaries where feasible. Each next
//! chunk starts exactly `overlap_words` words before the previous chunk's
//! end, so successive chunks overlap by a fixed whole-word count.

use crate::config::ChunkingConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One chunk of an article body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    /// Zero-based, contiguous per article
    pub chunk_index: u32,
    /// Chunk text, a verbatim slice of the original body
    pub text: String,
    pub word_count: u32,
    /// Byte offset of the chunk in the original body
    pub start_position: usize,
}

/// Splits long article bodies into overlapping chunks.
pub struct ArticleChunker {
    config: ChunkingConfig,
}

impl ArticleChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        let mut config = config;
        if config.overlap_words >= config.chunk_size_words {
            warn!(
                overlap = config.overlap_words,
                chunk_size = config.chunk_size_words,
                "overlap_words must be smaller than chunk_size_words, clamping"
            );
            config.overlap_words = config.chunk_size_words / 4;
        }
        Self { config }
    }

    /// Whether the body exceeds the chunking threshold.
    pub fn should_chunk(&self, body: &str) -> bool {
        word_count(body) > self.config.threshold_words
    }

    /// Chunks a body into overlapping windows. Returns an empty vector when
    /// the body is at or below the threshold (the caller indexes the whole
    /// article).
    pub fn chunk(&self, body: &str) -> Vec<ChunkSpan> {
        let words = word_spans(body);
        let n = words.len();
        if n <= self.config.threshold_words {
            return Vec::new();
        }

        let chunk_size = self.config.chunk_size_words;
        let overlap = self.config.overlap_words;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let ideal_end = (start + chunk_size).min(n);
            let end = if ideal_end == n {
                n
            } else {
                let snapped = self.snap_to_section_break(body, &words, ideal_end);
                // The next chunk starts at end - overlap; the end must sit
                // beyond start + overlap or the window cannot advance.
                if snapped > start + overlap {
                    snapped
                } else {
                    ideal_end
                }
            };

            let (first_start, _) = words[start];
            let (_, last_end) = words[end - 1];
            chunks.push(ChunkSpan {
                chunk_index: chunks.len() as u32,
                text: body[first_start..last_end].to_string(),
                word_count: (end - start) as u32,
                start_position: first_start,
            });

            if end == n {
                break;
            }
            start = end - overlap;
        }

        debug!(
            words = n,
            chunks = chunks.len(),
            "chunked article body"
        );
        chunks
    }

    /// Finds a word index near `ideal_end` whose preceding gap contains a
    /// section marker. Candidates are limited to the configured search
    /// window; the nearest wins, earlier on ties. The end-of-text index is
    /// never a candidate; that case is the caller's final chunk.
    fn snap_to_section_break(&self, body: &str, words: &[(usize, usize)], ideal_end: usize) -> usize {
        let window = self.config.boundary_search_words;
        let lo = ideal_end.saturating_sub(window).max(1);
        let hi = (ideal_end + window).min(words.len().saturating_sub(1));

        let mut best: Option<usize> = None;
        for candidate in lo..=hi {
            let gap = &body[words[candidate - 1].1..words[candidate].0];
            if !self
                .config
                .section_markers
                .iter()
                .any(|marker| gap.contains(marker.as_str()))
            {
                continue;
            }
            let distance = candidate.abs_diff(ideal_end);
            match best {
                Some(current) if candidate.abs_diff(ideal_end) >= current.abs_diff(ideal_end) => {}
                _ => best = Some(candidate),
            }
            // Exact hit cannot be improved
            if distance == 0 {
                break;
            }
        }

        best.unwrap_or(ideal_end)
    }
}

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Byte spans of whitespace-delimited words, in order.
fn word_spans(body: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, ch) in body.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, body.len()));
    }
    spans
}
