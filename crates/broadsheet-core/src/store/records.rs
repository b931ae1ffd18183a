//! Record types persisted by the article store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored article row. Created by the ingestion collaborator; the
/// `is_chunked` / `indexed` / `embedding_version` fields are mutated only
/// by the indexing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    /// Canonical url, globally unique
    pub url: String,
    /// Stable identifier from the source feed, globally unique when present
    pub guid: Option<String>,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub source: String,
    pub author: Option<String>,
    pub published_date: DateTime<Utc>,
    pub fetched_date: DateTime<Utc>,
    pub word_count: u32,
    /// True iff chunk rows reference this article
    pub is_chunked: bool,
    /// True iff the vector index holds at least one document for this article
    pub indexed: bool,
    /// Embedding version tag the article was last indexed under
    pub embedding_version: String,
    /// Extracted terms, carried through to search results
    pub terms: Vec<String>,
    pub tags: Vec<String>,
}

/// An article as produced by ingestion, before the store assigns an id and
/// computes the word count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub url: String,
    pub guid: Option<String>,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub source: String,
    pub author: Option<String>,
    pub published_date: DateTime<Utc>,
    pub fetched_date: DateTime<Utc>,
    pub terms: Vec<String>,
    pub tags: Vec<String>,
}

/// Result of a batch article upsert. Duplicate urls/guids are counted as
/// skipped rather than errors.
#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    pub inserted_ids: Vec<i64>,
    pub skipped: usize,
}

/// Feed health as tracked by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub url: String,
    pub name: String,
    pub status: FeedStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub article_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Active,
    Degraded,
    Failing,
    Disabled,
}

/// One source with its indexed article count and date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCount {
    pub name: String,
    pub article_count: usize,
    pub earliest_article: DateTime<Utc>,
    pub latest_article: DateTime<Utc>,
}

/// One author with their indexed article count and date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorStat {
    pub name: String,
    pub article_count: usize,
    pub earliest_article: DateTime<Utc>,
    pub latest_article: DateTime<Utc>,
}

/// Store-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_articles: usize,
    pub indexed_articles: usize,
    pub chunked_articles: usize,
    pub total_chunks: usize,
    pub sources_count: usize,
    pub earliest_article: Option<DateTime<Utc>>,
    pub latest_article: Option<DateTime<Utc>>,
}
