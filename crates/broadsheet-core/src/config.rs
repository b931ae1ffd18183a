//! Configuration for the search and indexing core.
//!
//! A single [`SearchConfig`] record enumerates every tunable: chunking
//! geometry, embedding model identity, retrieval depth, reranking signal
//! magnitudes and toggles, the distribution-adaptive semantic filter, and
//! the request pool. Every reranking signal carries its own `enabled` flag
//! so a signal can be rolled back without a code change.
//!
//! Defaults match the production deployment over the ~16k article corpus.

use serde::{Deserialize, Serialize};

/// How many times the article title is prepended to the body before
/// embedding. Applied to whole-article documents and the first chunk only.
pub const TITLE_WEIGHT_MULTIPLIER: usize = 5;

/// Maximum accepted query length in characters.
pub const MAX_QUERY_LENGTH: usize = 1000;

/// Maximum length of a quoted phrase body in characters.
pub const MAX_PHRASE_LENGTH: usize = 500;

/// Top-level configuration record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub reranking: RerankingConfig,
    pub semantic_filter: SemanticFilterConfig,
    pub runtime: RuntimeConfig,
}

/// Chunking geometry. Articles at or below `threshold_words` are indexed
/// whole; longer articles are split into overlapping windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunk articles longer than this many words
    pub threshold_words: usize,
    /// Target chunk size in words
    pub chunk_size_words: usize,
    /// Words of overlap between consecutive chunks
    pub overlap_words: usize,
    /// Section break markers, in priority order
    pub section_markers: Vec<String>,
    /// How far (in words) a chunk end may move to land on a section marker
    pub boundary_search_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            threshold_words: 5500,
            chunk_size_words: 2000,
            overlap_words: 300,
            section_markers: vec!["\n\n".to_string(), "\n".to_string()],
            boundary_search_words: 40,
        }
    }
}

/// Embedding model identity. The model is a pluggable dependency; the rest
/// of the pipeline only relies on `dimension`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_identifier: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_identifier: "BAAI/bge-base-en-v1.5".to_string(),
            dimension: 768,
        }
    }
}

/// Retrieval depth for the first-stage vector scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates fetched from the vector index before filtering; large
    /// enough to survive metadata filtering and deduplication
    pub retrieval_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { retrieval_k: 400 }
    }
}

/// Reranking signal configuration. Signals apply in a fixed order; each is
/// additive, clamped at its configured maximum, and individually
/// toggleable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankingConfig {
    /// Title term boost: fraction of query terms in the title, scaled
    pub title_boost_enabled: bool,
    pub title_boost_max: f32,

    /// Keyword frequency boost (pseudo-BM25 over fetched text)
    pub keyword_boost_enabled: bool,
    pub keyword_boost_max: f32,
    pub keyword_boost_scale: f32,
    pub keyword_density_scale: f32,
    /// Keyword stage examines only this many top candidates
    pub keyword_rerank_top_n: usize,
    /// Keyword stage considers at most this many query terms
    pub keyword_max_query_terms: usize,
    pub keyword_length_normalization: LengthNormalization,
    /// Offset inside the log length normalizer: `ln(word_count + offset)`
    pub keyword_log_base_offset: f32,

    pub phrase_presence_boost: PhrasePresenceConfig,
    pub semantic_discovery_boost: SemanticDiscoveryConfig,
    pub query_length_scaling: QueryLengthScalingConfig,
    pub recency_boost: RecencyBoostConfig,
}

impl Default for RerankingConfig {
    fn default() -> Self {
        Self {
            title_boost_enabled: true,
            title_boost_max: 0.08,
            keyword_boost_enabled: true,
            keyword_boost_max: 0.06,
            keyword_boost_scale: 0.02,
            keyword_density_scale: 10.0,
            keyword_rerank_top_n: 150,
            keyword_max_query_terms: 5,
            keyword_length_normalization: LengthNormalization::Log,
            keyword_log_base_offset: 10.0,
            phrase_presence_boost: PhrasePresenceConfig::default(),
            semantic_discovery_boost: SemanticDiscoveryConfig::default(),
            query_length_scaling: QueryLengthScalingConfig::default(),
            recency_boost: RecencyBoostConfig::default(),
        }
    }
}

/// Length normalization strategy for the keyword density computation.
///
/// `Log` divides term hits by `ln(word_count + offset)` so long
/// comprehensive articles are not disproportionately penalized. `Linear`
/// divides by the raw word count and exists as an A/B toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthNormalization {
    Linear,
    Log,
}

/// Phrase presence boost tiers. The first applicable tier wins per
/// candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhrasePresenceConfig {
    pub enabled: bool,
    /// Phrase appears in the title
    pub in_title: f32,
    /// Phrase appears in the content
    pub in_content: f32,
    /// Every query term appears somewhere in the title
    pub all_terms_in_title: f32,
}

impl Default for PhrasePresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            in_title: 0.08,
            in_content: 0.06,
            all_terms_in_title: 0.04,
        }
    }
}

/// Semantic discovery boost: rewards candidates with high semantic
/// similarity but little literal term overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticDiscoveryConfig {
    pub enabled: bool,
    pub min_semantic_score: f32,
    pub max_keyword_hits: u32,
    pub boost: f32,
}

impl Default for SemanticDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_semantic_score: 0.70,
            max_keyword_hits: 1,
            boost: 0.025,
        }
    }
}

/// Query-length scaling of all boost magnitudes: longer queries trust
/// semantic similarity more and keyword/title signals less. Driven by the
/// number of semantic terms only, not total clauses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLengthScalingConfig {
    /// Full boosts up to this many semantic terms
    pub short_terms: usize,
    /// `medium_multiplier` applies at exactly this many terms
    pub medium_terms: usize,
    pub medium_multiplier: f32,
    /// `long_multiplier` applies above `medium_terms`
    pub long_multiplier: f32,
}

impl Default for QueryLengthScalingConfig {
    fn default() -> Self {
        Self {
            short_terms: 3,
            medium_terms: 4,
            medium_multiplier: 0.5,
            long_multiplier: 0.25,
        }
    }
}

/// Recency boost tiers. At most one tier applies per candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencyBoostConfig {
    pub enabled: bool,
    pub within_7_days: f32,
    pub within_30_days: f32,
    pub within_90_days: f32,
    pub within_1_year: f32,
    pub within_3_years: f32,
}

impl Default for RecencyBoostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            within_7_days: 0.07,
            within_30_days: 0.05,
            within_90_days: 0.03,
            within_1_year: 0.02,
            within_3_years: 0.01,
        }
    }
}

/// Distribution-adaptive semantic threshold applied before the boost
/// signals. Tight score clusters imply the model is undifferentiating, so
/// the net widens carefully; wide spreads are trusted more.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticFilterConfig {
    pub enabled: bool,
    /// Floor below which candidates are always discarded
    pub min_absolute_threshold: f32,
    /// Base multiplier: threshold = mean - multiplier * std_dev
    pub std_multiplier: f32,
    /// Select the multiplier from the score distribution's regime
    pub distribution_adaptive: bool,
    pub tight_cluster_std_threshold: f32,
    pub tight_cluster_multiplier: f32,
    pub wide_spread_std_threshold: f32,
    pub wide_spread_multiplier: f32,
}

impl Default for SemanticFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_absolute_threshold: 0.25,
            std_multiplier: 2.0,
            distribution_adaptive: true,
            tight_cluster_std_threshold: 0.05,
            tight_cluster_multiplier: 1.0,
            wide_spread_std_threshold: 0.12,
            wide_spread_multiplier: 2.5,
        }
    }
}

/// Request pool sizing and time budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads serving queries
    pub search_workers: usize,
    /// Requests queued beyond the workers before `Overloaded`
    pub max_queued_requests: usize,
    /// Soft per-query budget; exceeded queries are logged
    pub soft_budget_ms: u64,
    /// Hard ceiling; exceeded queries surface `Timeout`
    pub hard_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            search_workers: 4,
            max_queued_requests: 24,
            soft_budget_ms: 500,
            hard_timeout_ms: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_consistent() {
        let config = SearchConfig::default();
        assert!(config.chunking.overlap_words < config.chunking.chunk_size_words);
        assert!(config.chunking.threshold_words >= config.chunking.chunk_size_words);
        assert_eq!(config.embedding.dimension, 768);
        assert!(config.retrieval.retrieval_k >= config.reranking.keyword_rerank_top_n);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = SearchConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SearchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.reranking.keyword_length_normalization,
            LengthNormalization::Log
        );
        assert_eq!(parsed.runtime.search_workers, 4);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: SearchConfig =
            serde_json::from_str(r#"{"retrieval": {"retrieval_k": 500}}"#).unwrap();
        assert_eq!(parsed.retrieval.retrieval_k, 500);
        assert_eq!(parsed.chunking.threshold_words, 5500);
    }

    #[test]
    fn query_length_tiers_are_ordered() {
        let scaling = QueryLengthScalingConfig::default();
        assert!(scaling.short_terms < scaling.medium_terms);
        assert!(scaling.medium_multiplier > scaling.long_multiplier);
    }
}
