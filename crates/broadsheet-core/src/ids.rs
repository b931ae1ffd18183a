//! Stable string identifiers for vector documents.
//!
//! Every document in the vector index is keyed by a string id that encodes
//! what it is:
//!
//! ```text
//! Whole articles:  "a_{article_id}"        -> "a_12345"
//! Chunks:          "c_{article_id}_{idx}"  -> "c_12345_0", "c_12345_1"
//! ```
//!
//! The ids are deterministic (the same article always gets the same id), so
//! incremental upserts replace rather than duplicate, and the prefixes make
//! integer collisions between articles and chunks impossible. Earlier
//! integer ids required scanning the index for a "next free id" during
//! updates, which produced duplicates after deletions.

use crate::error::SearchError;
use std::collections::HashMap;

const ARTICLE_PREFIX: &str = "a_";
const CHUNK_PREFIX: &str = "c_";

/// A parsed vector document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocId {
    /// A whole, non-chunked article
    Article { article_id: i64 },
    /// One chunk of a chunked article
    Chunk { article_id: i64, chunk_index: u32 },
}

impl DocId {
    /// Parses a document id string. Total and deterministic: every string
    /// either parses to exactly one variant or fails with `MalformedId`.
    pub fn parse(id: &str) -> Result<Self, SearchError> {
        if let Some(rest) = id.strip_prefix(ARTICLE_PREFIX) {
            let article_id = rest
                .parse::<i64>()
                .map_err(|_| SearchError::MalformedId(id.to_string()))?;
            return Ok(DocId::Article { article_id });
        }

        if let Some(rest) = id.strip_prefix(CHUNK_PREFIX) {
            let (article_part, index_part) = rest
                .split_once('_')
                .ok_or_else(|| SearchError::MalformedId(id.to_string()))?;
            let article_id = article_part
                .parse::<i64>()
                .map_err(|_| SearchError::MalformedId(id.to_string()))?;
            let chunk_index = index_part
                .parse::<u32>()
                .map_err(|_| SearchError::MalformedId(id.to_string()))?;
            return Ok(DocId::Chunk {
                article_id,
                chunk_index,
            });
        }

        Err(SearchError::MalformedId(id.to_string()))
    }

    /// The parent article id, for both variants.
    pub fn article_id(&self) -> i64 {
        match self {
            DocId::Article { article_id } => *article_id,
            DocId::Chunk { article_id, .. } => *article_id,
        }
    }

    /// True for the chunk variant.
    pub fn is_chunk(&self) -> bool {
        matches!(self, DocId::Chunk { .. })
    }

    /// Renders the id back to its string form.
    pub fn to_id_string(&self) -> String {
        match self {
            DocId::Article { article_id } => make_article_id(*article_id),
            DocId::Chunk {
                article_id,
                chunk_index,
            } => make_chunk_id(*article_id, *chunk_index),
        }
    }
}

/// Id for a whole, non-chunked article: `a_12345`.
pub fn make_article_id(article_id: i64) -> String {
    format!("{ARTICLE_PREFIX}{article_id}")
}

/// Id for one chunk of an article: `c_12345_0`.
pub fn make_chunk_id(article_id: i64, chunk_index: u32) -> String {
    format!("{CHUNK_PREFIX}{article_id}_{chunk_index}")
}

/// Extracts the parent article id from any document id string.
pub fn extract_article_id(id: &str) -> Result<i64, SearchError> {
    Ok(DocId::parse(id)?.article_id())
}

/// Groups document id strings by their parent article. Used by the
/// deduplication step to collapse chunk matches onto articles.
pub fn group_by_article<'a, I>(ids: I) -> Result<HashMap<i64, Vec<&'a str>>, SearchError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: HashMap<i64, Vec<&'a str>> = HashMap::new();
    for id in ids {
        groups.entry(extract_article_id(id)?).or_default().push(id);
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_ids_round_trip() {
        let id = make_article_id(12345);
        assert_eq!(id, "a_12345");
        assert_eq!(
            DocId::parse(&id).unwrap(),
            DocId::Article { article_id: 12345 }
        );
    }

    #[test]
    fn chunk_ids_round_trip() {
        let id = make_chunk_id(12345, 3);
        assert_eq!(id, "c_12345_3");
        let parsed = DocId::parse(&id).unwrap();
        assert_eq!(
            parsed,
            DocId::Chunk {
                article_id: 12345,
                chunk_index: 3
            }
        );
        assert_eq!(parsed.to_id_string(), id);
    }

    #[test]
    fn extract_works_for_both_variants() {
        assert_eq!(extract_article_id("a_100").unwrap(), 100);
        assert_eq!(extract_article_id("c_100_7").unwrap(), 100);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for bad in [
            "", "a_", "c_", "a_x", "c_12", "c_12_", "c_12_x", "c__0", "x_12", "12", "a_12_3",
        ] {
            assert!(
                matches!(DocId::parse(bad), Err(SearchError::MalformedId(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn group_by_article_collapses_chunks() {
        let ids = ["a_100", "c_200_0", "c_200_1", "a_300"];
        let groups = group_by_article(ids).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&200], vec!["c_200_0", "c_200_1"]);
        assert_eq!(groups[&100], vec!["a_100"]);
    }

    #[test]
    fn is_chunk_distinguishes_variants() {
        assert!(!DocId::parse("a_1").unwrap().is_chunk());
        assert!(DocId::parse("c_1_0").unwrap().is_chunk());
    }
}
