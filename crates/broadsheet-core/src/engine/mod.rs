//! End-to-end query pipeline.
//!
//! `search` drives: parse -> embed -> vector retrieval -> metadata filters
//! -> rerank -> chunk-to-article deduplication -> exact/title phrase
//! filters -> pagination -> enrichment of the returned page. The engine
//! holds read-only references to the vector index and article store and no
//! mutable state between queries; readers run concurrently while the
//! indexing service holds the index write lock only during update batches.

mod pool;

pub use pool::SearchPool;

use crate::config::SearchConfig;
use crate::embedding::Embedder;
use crate::error::SearchError;
use crate::filters::FilterSpec;
use crate::ids::DocId;
use crate::index::VectorIndex;
use crate::query::{parse_query, ParsedQuery};
use crate::rerank::{Candidate, Reranker};
use crate::store::{Article, ArticleStore, AuthorStat, SourceCount, StoreStats};
use crate::text::{contains_phrase, find_phrase, make_excerpt};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default page size when the caller passes zero.
const DEFAULT_LIMIT: usize = 10;
/// Hard cap on page size.
const MAX_LIMIT: usize = 100;
/// Excerpt length in characters.
const EXCERPT_LENGTH: usize = 200;

/// One enriched search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Vector document id of the best-scoring representative
    pub id: String,
    pub article_id: i64,
    pub title: String,
    pub url: String,
    pub source: String,
    pub author: Option<String>,
    pub published_date: DateTime<Utc>,
    pub excerpt: String,
    /// The first exact phrase found in the content, for UI highlighting
    pub matched_phrase: Option<String>,
    /// How many documents (chunks) of this article matched the query
    pub matched_sections: usize,
    pub score: f32,
    pub word_count: u32,
    pub tags: Vec<String>,
}

/// Search results plus observability metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    /// Post-filter, pre-pagination count of unique articles
    pub total: usize,
    pub query_time_ms: u64,
    /// Echo of the parsed query components
    pub parsed_query: ParsedQuery,
}

/// Combined store and index statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub store: StoreStats,
    pub index_documents: usize,
}

/// Liveness summary for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub healthy: bool,
    pub index_documents: usize,
    pub total_articles: usize,
}

/// Read-only search orchestrator.
pub struct SearchEngine {
    store: Arc<ArticleStore>,
    index: Arc<RwLock<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    reranker: Reranker,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        store: Arc<ArticleStore>,
        index: Arc<RwLock<VectorIndex>>,
        embedder: Arc<dyn Embedder>,
        config: SearchConfig,
    ) -> Self {
        let reranker = Reranker::new(config.reranking.clone(), config.semantic_filter.clone());
        Self {
            store,
            index,
            embedder,
            reranker,
            config,
        }
    }

    /// Executes a query end to end. An empty query returns an empty result
    /// set with `total = 0` and no error.
    pub fn search(
        &self,
        query: &str,
        filters: &FilterSpec,
        limit: usize,
        offset: usize,
    ) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let now = Utc::now();
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit.min(MAX_LIMIT) };

        let parsed = parse_query(query)?;
        if !parsed.has_content() {
            return Ok(SearchResponse {
                results: Vec::new(),
                total: 0,
                query_time_ms: started.elapsed().as_millis() as u64,
                parsed_query: parsed,
            });
        }
        debug!(
            semantic = ?parsed.semantic_terms,
            exact = ?parsed.exact_phrases,
            title = ?parsed.title_phrases,
            author = ?parsed.author_filter,
            "parsed query"
        );

        // Power-user author syntax takes precedence over the UI filter
        let mut filters = filters.clone();
        if parsed.author_filter.is_some() {
            filters.author = parsed.author_filter.clone();
        }

        // Quote-only queries embed the raw query text
        let semantic_query = parsed.semantic_query();
        let embed_input = if semantic_query.is_empty() {
            query.trim().to_string()
        } else {
            semantic_query
        };
        let query_vector = self
            .embedder
            .embed(&[embed_input])?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::IndexUnavailable("embedder returned nothing".into()))?;

        let retrieved = {
            let index = self
                .index
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let hits = index.search(&query_vector, self.config.retrieval.retrieval_k)?;
            hits.into_iter()
                .filter_map(|(doc_id, score)| match index.metadata(&doc_id) {
                    Some(meta) => Some((doc_id, score, meta.clone())),
                    None => None,
                })
                .collect::<Vec<_>>()
        };

        // Fetch the article rows once; candidates whose article vanished
        // from the store are logged and dropped
        let mut article_ids: Vec<i64> = Vec::new();
        for (_, _, meta) in &retrieved {
            if !article_ids.contains(&meta.article_id) {
                article_ids.push(meta.article_id);
            }
        }
        let articles: HashMap<i64, Article> = self
            .store
            .get_articles(&article_ids)?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        let allowed: Vec<i64> = self.store.filter_candidates(&article_ids, &filters, now)?;
        let allowed: std::collections::HashSet<i64> = allowed.into_iter().collect();

        let mut candidates: Vec<Candidate> = Vec::with_capacity(retrieved.len());
        for (doc_id, score, meta) in retrieved {
            if !allowed.contains(&meta.article_id) {
                continue;
            }
            let Some(article) = articles.get(&meta.article_id) else {
                warn!(doc_id = %doc_id, "index/store mismatch, dropping candidate");
                continue;
            };
            let mut candidate = Candidate::new(doc_id, meta.article_id, score);
            candidate.title = article.title.clone();
            candidate.published_date = Some(article.published_date);
            candidate.word_count = article.word_count;
            candidates.push(candidate);
        }

        // Candidate text for the keyword and phrase-content signals: chunk
        // text for chunk documents, article content otherwise. Fetched for
        // the top keyword candidates only.
        let top_n = self.config.reranking.keyword_rerank_top_n;
        for candidate in candidates.iter_mut().take(top_n) {
            match DocId::parse(&candidate.doc_id)? {
                DocId::Article { .. } => {
                    if let Some(article) = articles.get(&candidate.article_id) {
                        candidate.text = Some(article.content.clone());
                    }
                }
                DocId::Chunk {
                    article_id,
                    chunk_index,
                } => {
                    if let Some(chunk) = self
                        .store
                        .get_chunks(article_id, &[chunk_index])?
                        .into_iter()
                        .next()
                    {
                        candidate.word_count = chunk.word_count;
                        candidate.text = Some(chunk.text);
                    }
                }
            }
        }

        let reranked = self.reranker.rerank(candidates, &parsed, now);

        // Deduplicate chunks to articles: the list is already in final
        // order, so the first document seen per article is its best
        let mut representatives: Vec<Candidate> = Vec::new();
        let mut sections: HashMap<i64, usize> = HashMap::new();
        for candidate in reranked {
            let count = sections.entry(candidate.article_id).or_insert(0);
            *count += 1;
            if *count == 1 {
                representatives.push(candidate);
            }
        }

        // Phrase filters run against stored content fetched for survivors
        let survivors: Vec<Candidate> = representatives
            .into_iter()
            .filter(|candidate| {
                let Some(article) = articles.get(&candidate.article_id) else {
                    return false;
                };
                self.passes_phrase_filters(article, &parsed)
            })
            .collect();

        let total = survivors.len();
        let page: Vec<SearchHit> = survivors
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|candidate| {
                let article = &articles[&candidate.article_id];
                self.enrich(candidate, article, &parsed, &sections)
            })
            .collect();

        let query_time_ms = started.elapsed().as_millis() as u64;
        if query_time_ms > self.config.runtime.soft_budget_ms {
            warn!(query_time_ms, "query exceeded soft budget");
        }
        info!(
            total,
            returned = page.len(),
            query_time_ms,
            "search complete"
        );

        Ok(SearchResponse {
            results: page,
            total,
            query_time_ms,
            parsed_query: parsed,
        })
    }

    /// Exact phrases must appear whole-word in the article's title or
    /// content; title phrases are case-insensitive substrings of the title
    /// only. The author predicate was merged into the metadata filter.
    fn passes_phrase_filters(&self, article: &Article, parsed: &ParsedQuery) -> bool {
        if !parsed.exact_phrases.is_empty() {
            let all_present = parsed.exact_phrases.iter().all(|phrase| {
                contains_phrase(&article.title, phrase) || contains_phrase(&article.content, phrase)
            });
            if !all_present {
                return false;
            }
        }
        if !parsed.title_phrases.is_empty() {
            let title = article.title.to_lowercase();
            let all_present = parsed
                .title_phrases
                .iter()
                .all(|phrase| title.contains(&phrase.to_lowercase()));
            if !all_present {
                return false;
            }
        }
        true
    }

    fn enrich(
        &self,
        candidate: Candidate,
        article: &Article,
        parsed: &ParsedQuery,
        sections: &HashMap<i64, usize>,
    ) -> SearchHit {
        let matched_phrase = parsed
            .exact_phrases
            .iter()
            .find(|phrase| find_phrase(&article.content, phrase).is_some())
            .cloned();
        let anchor = matched_phrase
            .as_ref()
            .and_then(|phrase| find_phrase(&article.content, phrase));
        let excerpt = make_excerpt(&article.content, anchor, EXCERPT_LENGTH);

        SearchHit {
            id: candidate.doc_id,
            article_id: article.id,
            title: article.title.clone(),
            url: article.url.clone(),
            source: article.source.clone(),
            author: article.author.clone(),
            published_date: article.published_date,
            excerpt,
            matched_phrase,
            matched_sections: sections.get(&article.id).copied().unwrap_or(1),
            score: candidate.score,
            word_count: article.word_count,
            tags: article.tags.clone(),
        }
    }

    /// Indexed sources with counts, most prolific first.
    pub fn sources(&self) -> Result<Vec<SourceCount>, SearchError> {
        Ok(self.store.list_sources()?)
    }

    /// Authors with at least `min_count` indexed articles.
    pub fn top_authors(&self, min_count: usize) -> Result<Vec<AuthorStat>, SearchError> {
        Ok(self.store.top_authors(min_count)?)
    }

    /// Store statistics plus the live index document count.
    pub fn stats(&self) -> Result<EngineStats, SearchError> {
        let store = self.store.stats()?;
        let index_documents = self
            .index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .count();
        Ok(EngineStats {
            store,
            index_documents,
        })
    }

    pub fn health(&self) -> Result<Health, SearchError> {
        let stats = self.stats()?;
        Ok(Health {
            healthy: stats.index_documents > 0 || stats.store.total_articles == 0,
            index_documents: stats.index_documents,
            total_articles: stats.store.total_articles,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }
}
