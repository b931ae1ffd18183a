//! Indexing service: brings the vector index into agreement with the
//! article store.
//!
//! Two modes: `build` clears the index and processes every article in
//! ascending-id order; `update` processes only articles that were never
//! indexed or were indexed under a different embedding version. Progress is
//! committed per article: chunk rows and vector documents are written
//! before the `indexed` flag is set, and any partially written vector
//! documents are removed when an article fails, so the flag always agrees
//! with index membership. Per-article failures are logged and skipped; the
//! batch continues and the next update pass retries.

use crate::chunking::ArticleChunker;
use crate::config::{SearchConfig, TITLE_WEIGHT_MULTIPLIER};
use crate::embedding::Embedder;
use crate::error::IndexingError;
use crate::ids::{make_article_id, make_chunk_id};
use crate::index::{DocMetadata, VectorIndex};
use crate::store::{Article, ArticleStore};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{info, warn};

/// Summary of a build or update run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub articles_processed: usize,
    pub articles_chunked: usize,
    pub chunks_created: usize,
    pub documents_indexed: usize,
    pub articles_failed: usize,
    pub duration_ms: u64,
}

/// Orchestrates chunking, document preparation, embedding, and index
/// mutation. The only component that writes to the store's indexing fields
/// or to the vector index.
pub struct IndexingService {
    store: Arc<ArticleStore>,
    index: Arc<RwLock<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    chunker: ArticleChunker,
    /// Version tag written to articles; the embedding model identifier, so
    /// swapping models marks every article stale
    embedding_version: String,
}

impl IndexingService {
    pub fn new(
        store: Arc<ArticleStore>,
        index: Arc<RwLock<VectorIndex>>,
        embedder: Arc<dyn Embedder>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            chunker: ArticleChunker::new(config.chunking.clone()),
            embedding_version: config.embedding.model_identifier.clone(),
        }
    }

    /// Rebuilds the index from scratch over every article, then persists it.
    pub fn build(&self, index_dir: &Path) -> Result<IndexingStats, IndexingError> {
        let started = Instant::now();
        let articles = self.store.all_articles()?;
        info!(articles = articles.len(), "building vector index");

        let mut stats = IndexingStats::default();
        {
            let mut index = self
                .index
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *index = VectorIndex::new(self.embedder.dimension());
            for article in &articles {
                self.index_one(&mut index, article, &mut stats);
            }
            index.save(index_dir)?;
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            processed = stats.articles_processed,
            chunked = stats.articles_chunked,
            documents = stats.documents_indexed,
            failed = stats.articles_failed,
            duration_ms = stats.duration_ms,
            "index build complete"
        );
        Ok(stats)
    }

    /// Incrementally indexes articles that are unindexed or carry a stale
    /// embedding version. Existing vector documents for each article are
    /// removed before reinsertion, so running twice with no intervening
    /// article changes is a no-op.
    pub fn update(&self, index_dir: &Path) -> Result<IndexingStats, IndexingError> {
        let started = Instant::now();
        let pending = self.store.unindexed_articles(&self.embedding_version)?;
        if pending.is_empty() {
            info!("no articles to index");
            return Ok(IndexingStats::default());
        }
        info!(articles = pending.len(), "incremental index update");

        let mut stats = IndexingStats::default();
        {
            let mut index = self
                .index
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for article in &pending {
                index.delete_article(article.id);
                self.index_one(&mut index, article, &mut stats);
            }
            index.save(index_dir)?;
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            processed = stats.articles_processed,
            documents = stats.documents_indexed,
            failed = stats.articles_failed,
            duration_ms = stats.duration_ms,
            "incremental update complete"
        );
        Ok(stats)
    }

    /// Indexes one article, isolating failures: on error every vector
    /// document already written for the article is removed and the article
    /// is left unindexed for the next pass.
    fn index_one(&self, index: &mut VectorIndex, article: &Article, stats: &mut IndexingStats) {
        stats.articles_processed += 1;
        match self.index_article(index, article, stats) {
            Ok(documents) => stats.documents_indexed += documents,
            Err(err) => {
                warn!(
                    article_id = article.id,
                    error = %err,
                    "failed to index article, skipping"
                );
                index.delete_article(article.id);
                stats.articles_failed += 1;
            }
        }
    }

    fn index_article(
        &self,
        index: &mut VectorIndex,
        article: &Article,
        stats: &mut IndexingStats,
    ) -> Result<usize, IndexingError> {
        let chunks = if self.chunker.should_chunk(&article.content) {
            self.chunker.chunk(&article.content)
        } else {
            Vec::new()
        };

        let mut doc_ids = Vec::new();
        let mut texts = Vec::new();
        let mut metadata = Vec::new();
        if chunks.is_empty() {
            doc_ids.push(make_article_id(article.id));
            texts.push(prepare_document(&article.title, &article.content));
            metadata.push(doc_metadata(article, false, 0));
        } else {
            stats.articles_chunked += 1;
            stats.chunks_created += chunks.len();
            for chunk in &chunks {
                doc_ids.push(make_chunk_id(article.id, chunk.chunk_index));
                // Title weighting on the first chunk only, so title matches
                // do not surface every chunk of the same article
                let text = if chunk.chunk_index == 0 {
                    prepare_document(&article.title, &chunk.text)
                } else {
                    chunk.text.clone()
                };
                texts.push(text);
                metadata.push(doc_metadata(article, true, chunk.chunk_index));
            }
        }

        let vectors = self.embedder.embed(&texts)?;

        // Chunk rows first, vector documents second, flag last: a failure
        // anywhere leaves the article unindexed and retryable
        self.store.replace_chunks(article.id, &chunks)?;
        for ((doc_id, meta), vector) in doc_ids.iter().zip(metadata).zip(vectors) {
            index.upsert(doc_id, meta, vector)?;
        }
        self.store.mark_indexed(article.id, &self.embedding_version)?;

        Ok(doc_ids.len())
    }
}

/// Prepends the title `TITLE_WEIGHT_MULTIPLIER` times so cosine similarity
/// favors title terms without a separate field index.
fn prepare_document(title: &str, body: &str) -> String {
    let mut prepared = String::with_capacity((title.len() + 2) * TITLE_WEIGHT_MULTIPLIER + body.len());
    for _ in 0..TITLE_WEIGHT_MULTIPLIER {
        prepared.push_str(title);
        prepared.push_str(". ");
    }
    prepared.push_str(body);
    prepared
}

fn doc_metadata(article: &Article, is_chunk: bool, chunk_index: u32) -> DocMetadata {
    DocMetadata {
        article_id: article.id,
        title: article.title.clone(),
        source: article.source.clone(),
        author: article.author.clone(),
        published_date: Some(article.published_date),
        is_chunk,
        chunk_index,
    }
}
