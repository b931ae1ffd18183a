//! Persistent article store.
//!
//! Backed by [redb](https://github.com/cberner/redb), a pure-Rust,
//! ACID-compliant embedded B-tree database. Records are stored as JSON
//! bytes; url and guid uniqueness is enforced through dedicated index
//! tables inside the same write transaction as the article insert.
//!
//! # Tables
//!
//! - `articles`: article_id (i64) -> Article (JSON)
//! - `articles_by_url`: url -> article_id
//! - `articles_by_guid`: guid -> article_id
//! - `chunks`: (article_id, chunk_index) -> ChunkSpan (JSON)
//! - `feeds`: feed url -> FeedRecord (JSON)
//! - `meta`: key -> counter (next article id)
//!
//! The store exclusively owns article and chunk rows. The indexing service
//! is the only writer of the `indexed` / `is_chunked` / `embedding_version`
//! fields; the search engine is strictly read-only. redb serializes writers
//! and gives readers MVCC snapshots, so an article and its chunks are
//! always observed either both-old or both-new.

mod records;

pub use records::{
    Article, AuthorStat, FeedRecord, FeedStatus, NewArticle, SourceCount, StoreStats,
    UpsertOutcome,
};

use crate::chunking::{word_count, ChunkSpan};
use crate::error::StoreError;
use crate::filters::FilterSpec;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

const ARTICLES: TableDefinition<i64, &[u8]> = TableDefinition::new("articles");
const ARTICLES_BY_URL: TableDefinition<&str, i64> = TableDefinition::new("articles_by_url");
const ARTICLES_BY_GUID: TableDefinition<&str, i64> = TableDefinition::new("articles_by_guid");
const CHUNKS: TableDefinition<(i64, u32), &[u8]> = TableDefinition::new("chunks");
const FEEDS: TableDefinition<&str, &[u8]> = TableDefinition::new("feeds");
const META: TableDefinition<&str, i64> = TableDefinition::new("meta");

const NEXT_ARTICLE_ID_KEY: &str = "next_article_id";

/// Article and chunk storage with a predicate-query read side.
pub struct ArticleStore {
    db: Database,
}

impl ArticleStore {
    /// Opens or creates the store at the given path, creating all tables.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| StoreError::Database(format!("failed to open database: {e}")))?;
        {
            let txn = db
                .begin_write()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            txn.open_table(ARTICLES)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            txn.open_table(ARTICLES_BY_URL)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            txn.open_table(ARTICLES_BY_GUID)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            txn.open_table(CHUNKS)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            txn.open_table(FEEDS)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            txn.open_table(META)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            txn.commit()
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        info!(path = %path.as_ref().display(), "article store opened");
        Ok(Self { db })
    }

    // =========================================================================
    // Write side (ingestion and indexing)
    // =========================================================================

    /// Inserts a batch of articles. Rows whose url or guid already exists
    /// are silently dropped, not overwritten; the ingestion collaborator
    /// is idempotent by url.
    pub fn upsert_articles(&self, batch: Vec<NewArticle>) -> Result<UpsertOutcome, StoreError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut outcome = UpsertOutcome::default();
        {
            let mut articles = txn
                .open_table(ARTICLES)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let mut by_url = txn
                .open_table(ARTICLES_BY_URL)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let mut by_guid = txn
                .open_table(ARTICLES_BY_GUID)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let mut meta = txn
                .open_table(META)
                .map_err(|e| StoreError::Database(e.to_string()))?;

            for new_article in batch {
                let url_taken = by_url
                    .get(new_article.url.as_str())
                    .map_err(|e| StoreError::Database(e.to_string()))?
                    .is_some();
                let guid_taken = match &new_article.guid {
                    Some(guid) => by_guid
                        .get(guid.as_str())
                        .map_err(|e| StoreError::Database(e.to_string()))?
                        .is_some(),
                    None => false,
                };
                if url_taken || guid_taken {
                    outcome.skipped += 1;
                    continue;
                }

                let id = {
                    let next = meta
                        .get(NEXT_ARTICLE_ID_KEY)
                        .map_err(|e| StoreError::Database(e.to_string()))?
                        .map(|v| v.value())
                        .unwrap_or(1);
                    meta.insert(NEXT_ARTICLE_ID_KEY, next + 1)
                        .map_err(|e| StoreError::Database(e.to_string()))?;
                    next
                };

                let article = Article {
                    id,
                    word_count: word_count(&new_article.content) as u32,
                    url: new_article.url,
                    guid: new_article.guid,
                    title: new_article.title,
                    content: new_article.content,
                    summary: new_article.summary,
                    source: new_article.source,
                    author: new_article.author,
                    published_date: new_article.published_date,
                    fetched_date: new_article.fetched_date,
                    is_chunked: false,
                    indexed: false,
                    embedding_version: String::new(),
                    terms: new_article.terms,
                    tags: new_article.tags,
                };

                by_url
                    .insert(article.url.as_str(), id)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                if let Some(guid) = &article.guid {
                    by_guid
                        .insert(guid.as_str(), id)
                        .map_err(|e| StoreError::Database(e.to_string()))?;
                }
                let bytes = serialize(&article)?;
                articles
                    .insert(id, bytes.as_slice())
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                outcome.inserted_ids.push(id);
            }
        }
        txn.commit()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        debug!(
            inserted = outcome.inserted_ids.len(),
            skipped = outcome.skipped,
            "article batch upserted"
        );
        Ok(outcome)
    }

    /// Replaces every chunk row for an article in one transaction and sets
    /// the `is_chunked` flag to match.
    pub fn replace_chunks(&self, article_id: i64, chunks: &[ChunkSpan]) -> Result<(), StoreError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        {
            let mut chunk_table = txn
                .open_table(CHUNKS)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let existing: Vec<(i64, u32)> = chunk_table
                .range((article_id, 0u32)..=(article_id, u32::MAX))
                .map_err(|e| StoreError::Database(e.to_string()))?
                .filter_map(|entry| entry.ok().map(|(key, _)| key.value()))
                .collect();
            for key in existing {
                chunk_table
                    .remove(key)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
            for chunk in chunks {
                let bytes = serialize(chunk)?;
                chunk_table
                    .insert((article_id, chunk.chunk_index), bytes.as_slice())
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }

            let mut articles = txn
                .open_table(ARTICLES)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let mut article = read_article(&articles, article_id)?
                .ok_or(StoreError::ArticleNotFound(article_id))?;
            article.is_chunked = !chunks.is_empty();
            let bytes = serialize(&article)?;
            articles
                .insert(article_id, bytes.as_slice())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        txn.commit()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Marks an article as indexed under the given embedding version.
    pub fn mark_indexed(&self, article_id: i64, embedding_version: &str) -> Result<(), StoreError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        {
            let mut articles = txn
                .open_table(ARTICLES)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let mut article = read_article(&articles, article_id)?
                .ok_or(StoreError::ArticleNotFound(article_id))?;
            article.indexed = true;
            article.embedding_version = embedding_version.to_string();
            let bytes = serialize(&article)?;
            articles
                .insert(article_id, bytes.as_slice())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        txn.commit()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Records feed health for the ingestion collaborator.
    pub fn upsert_feed(&self, feed: &FeedRecord) -> Result<(), StoreError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        {
            let mut feeds = txn
                .open_table(FEEDS)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let bytes = serialize(feed)?;
            feeds
                .insert(feed.url.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        txn.commit()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // Read side (search)
    // =========================================================================

    pub fn get_article(&self, article_id: i64) -> Result<Option<Article>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let articles = txn
            .open_table(ARTICLES)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        read_article(&articles, article_id)
    }

    /// Batch fetch; missing ids are skipped.
    pub fn get_articles(&self, ids: &[i64]) -> Result<Vec<Article>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let articles = txn
            .open_table(ARTICLES)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut found = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(article) = read_article(&articles, id)? {
                found.push(article);
            }
        }
        Ok(found)
    }

    /// Chunks of an article restricted to the given indices.
    pub fn get_chunks(
        &self,
        article_id: i64,
        indices: &[u32],
    ) -> Result<Vec<ChunkSpan>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let chunks = txn
            .open_table(CHUNKS)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut found = Vec::with_capacity(indices.len());
        for &index in indices {
            if let Some(guard) = chunks
                .get((article_id, index))
                .map_err(|e| StoreError::Database(e.to_string()))?
            {
                found.push(deserialize::<ChunkSpan>(guard.value())?);
            }
        }
        Ok(found)
    }

    /// All chunks of an article, in index order.
    pub fn get_all_chunks(&self, article_id: i64) -> Result<Vec<ChunkSpan>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let chunks = txn
            .open_table(CHUNKS)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut found = Vec::new();
        for entry in chunks
            .range((article_id, 0u32)..=(article_id, u32::MAX))
            .map_err(|e| StoreError::Database(e.to_string()))?
        {
            let (_, value) = entry.map_err(|e| StoreError::Database(e.to_string()))?;
            found.push(deserialize::<ChunkSpan>(value.value())?);
        }
        Ok(found)
    }

    /// All articles in ascending id order, the stable order used by index
    /// builds.
    pub fn all_articles(&self) -> Result<Vec<Article>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let articles = txn
            .open_table(ARTICLES)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut found = Vec::new();
        for entry in articles
            .iter()
            .map_err(|e| StoreError::Database(e.to_string()))?
        {
            let (_, value) = entry.map_err(|e| StoreError::Database(e.to_string()))?;
            found.push(deserialize::<Article>(value.value())?);
        }
        Ok(found)
    }

    /// Articles needing (re)indexing: never indexed, or indexed under a
    /// different embedding version.
    pub fn unindexed_articles(&self, current_version: &str) -> Result<Vec<Article>, StoreError> {
        Ok(self
            .all_articles()?
            .into_iter()
            .filter(|a| !a.indexed || a.embedding_version != current_version)
            .collect())
    }

    /// Applies metadata predicates to candidate ids, preserving order.
    /// Candidates with no article row are dropped.
    pub fn filter_candidates(
        &self,
        ids: &[i64],
        spec: &FilterSpec,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        if spec.is_empty() {
            return Ok(ids.to_vec());
        }
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let articles = txn
            .open_table(ARTICLES)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut kept = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(article) = read_article(&articles, id)? else {
                continue;
            };
            if spec.matches(
                &article.source,
                article.author.as_deref(),
                article.published_date,
                article.word_count,
                now,
            ) {
                kept.push(id);
            }
        }
        Ok(kept)
    }

    /// Indexed sources with article counts and date ranges, most prolific
    /// first.
    pub fn list_sources(&self) -> Result<Vec<SourceCount>, StoreError> {
        let mut by_source: HashMap<String, SourceCount> = HashMap::new();
        for article in self.all_articles()? {
            if !article.indexed {
                continue;
            }
            let entry = by_source
                .entry(article.source.clone())
                .or_insert_with(|| SourceCount {
                    name: article.source.clone(),
                    article_count: 0,
                    earliest_article: article.published_date,
                    latest_article: article.published_date,
                });
            entry.article_count += 1;
            entry.earliest_article = entry.earliest_article.min(article.published_date);
            entry.latest_article = entry.latest_article.max(article.published_date);
        }
        let mut sources: Vec<SourceCount> = by_source.into_values().collect();
        sources.sort_by(|a, b| {
            b.article_count
                .cmp(&a.article_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(sources)
    }

    /// Authors with at least `min_count` indexed articles, most prolific
    /// first.
    pub fn top_authors(&self, min_count: usize) -> Result<Vec<AuthorStat>, StoreError> {
        let mut by_author: HashMap<String, AuthorStat> = HashMap::new();
        for article in self.all_articles()? {
            if !article.indexed {
                continue;
            }
            let Some(author) = article.author.clone().filter(|a| !a.is_empty()) else {
                continue;
            };
            let entry = by_author.entry(author.clone()).or_insert_with(|| AuthorStat {
                name: author,
                article_count: 0,
                earliest_article: article.published_date,
                latest_article: article.published_date,
            });
            entry.article_count += 1;
            entry.earliest_article = entry.earliest_article.min(article.published_date);
            entry.latest_article = entry.latest_article.max(article.published_date);
        }
        let mut authors: Vec<AuthorStat> = by_author
            .into_values()
            .filter(|a| a.article_count >= min_count)
            .collect();
        authors.sort_by(|a, b| {
            b.article_count
                .cmp(&a.article_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(authors)
    }

    /// Store-wide statistics.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let articles = self.all_articles()?;
        let total_articles = articles.len();
        let mut indexed_articles = 0;
        let mut chunked_articles = 0;
        let mut sources = std::collections::HashSet::new();
        let mut earliest: Option<DateTime<Utc>> = None;
        let mut latest: Option<DateTime<Utc>> = None;
        for article in &articles {
            if article.indexed {
                indexed_articles += 1;
                sources.insert(article.source.clone());
                earliest = Some(earliest.map_or(article.published_date, |e| {
                    e.min(article.published_date)
                }));
                latest = Some(latest.map_or(article.published_date, |l| {
                    l.max(article.published_date)
                }));
            }
            if article.is_chunked {
                chunked_articles += 1;
            }
        }

        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let chunks = txn
            .open_table(CHUNKS)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let total_chunks = chunks
            .iter()
            .map_err(|e| StoreError::Database(e.to_string()))?
            .count();

        Ok(StoreStats {
            total_articles,
            indexed_articles,
            chunked_articles,
            total_chunks,
            sources_count: sources.len(),
            earliest_article: earliest,
            latest_article: latest,
        })
    }

    /// Feed health records, as written by the ingestion collaborator.
    pub fn list_feeds(&self) -> Result<Vec<FeedRecord>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let feeds = txn
            .open_table(FEEDS)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut found = Vec::new();
        for entry in feeds
            .iter()
            .map_err(|e| StoreError::Database(e.to_string()))?
        {
            let (_, value) = entry.map_err(|e| StoreError::Database(e.to_string()))?;
            found.push(deserialize::<FeedRecord>(value.value())?);
        }
        Ok(found)
    }
}

fn read_article(
    table: &impl ReadableTable<i64, &'static [u8]>,
    article_id: i64,
) -> Result<Option<Article>, StoreError> {
    match table
        .get(article_id)
        .map_err(|e| StoreError::Database(e.to_string()))?
    {
        Some(guard) => Ok(Some(deserialize::<Article>(guard.value())?)),
        None => Ok(None),
    }
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests;
