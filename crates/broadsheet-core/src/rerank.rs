//! Multi-signal reranking over retrieval candidates.
//!
//! The vector index returns cosine similarities; this module adjusts them
//! with additive, clamped signals computed from the candidate's title,
//! text, and publication date. Signals run in a fixed order and every
//! contribution derives from the preserved `base_score`, so applying the
//! pipeline to an already-reranked list reproduces the same scores.
//!
//! Signal order: distribution-adaptive semantic threshold (a filter, not a
//! boost), title term boost, phrase presence boost, keyword frequency
//! boost, semantic discovery boost, recency boost. All boost magnitudes
//! scale with the query-length multiplier.

use crate::config::{LengthNormalization, RerankingConfig, SemanticFilterConfig};
use crate::query::ParsedQuery;
use crate::text::{contains_phrase, contains_whole_word, count_whole_word};
use chrono::{DateTime, Utc};
use tracing::debug;

/// A retrieval candidate flowing through the rerank pipeline.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub doc_id: String,
    pub article_id: i64,
    pub title: String,
    /// Candidate text (chunk or whole-article content), fetched on demand
    /// for the top candidates only
    pub text: Option<String>,
    pub word_count: u32,
    pub published_date: Option<DateTime<Utc>>,
    /// Cosine similarity from the vector index, never mutated
    pub base_score: f32,
    /// Reranked score: `base_score` plus signal contributions
    pub score: f32,
    /// Whole-word query-term hits observed by the keyword stage; `None`
    /// when the stage did not examine this candidate. Recorded whenever the
    /// candidate falls inside the examined top-N window, even with the
    /// keyword score contribution disabled, so the discovery signal stays
    /// independently toggleable.
    pub keyword_hits: Option<u32>,
}

impl Candidate {
    pub fn new(doc_id: String, article_id: i64, base_score: f32) -> Self {
        Self {
            doc_id,
            article_id,
            title: String::new(),
            text: None,
            word_count: 0,
            published_date: None,
            base_score,
            score: base_score,
            keyword_hits: None,
        }
    }
}

/// Applies the reranking pipeline.
pub struct Reranker {
    config: RerankingConfig,
    filter: SemanticFilterConfig,
}

impl Reranker {
    pub fn new(config: RerankingConfig, filter: SemanticFilterConfig) -> Self {
        Self { config, filter }
    }

    /// Reranks candidates in place of their base scores and returns them in
    /// final order: descending score, ties broken by descending publication
    /// date, then ascending article id.
    pub fn rerank(
        &self,
        mut candidates: Vec<Candidate>,
        parsed: &ParsedQuery,
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        if candidates.is_empty() {
            return candidates;
        }

        candidates = self.apply_semantic_threshold(candidates);

        // Deterministic order for the top-N keyword stage
        candidates.sort_by(|a, b| {
            b.base_score
                .partial_cmp(&a.base_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });

        let multiplier = self.query_length_multiplier(parsed.semantic_terms.len());
        let phrases = candidate_phrases(parsed);

        for (rank, candidate) in candidates.iter_mut().enumerate() {
            let mut score = candidate.base_score;
            score += self.title_term_boost(candidate, parsed) * multiplier;
            score += self.phrase_presence_boost(candidate, parsed, &phrases) * multiplier;

            if rank < self.config.keyword_rerank_top_n {
                score += self.keyword_frequency_boost(candidate, parsed) * multiplier;
            } else {
                candidate.keyword_hits = None;
            }

            score += self.semantic_discovery_boost(candidate) * multiplier;
            score += self.recency_boost(candidate, now) * multiplier;
            candidate.score = score;
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.published_date.cmp(&a.published_date))
                .then_with(|| a.article_id.cmp(&b.article_id))
        });
        candidates
    }

    /// Discards candidates whose base score falls below the
    /// distribution-derived threshold. Tight clusters mean the model is not
    /// differentiating, so the stricter multiplier applies; wide spreads
    /// are trusted with a larger one.
    fn apply_semantic_threshold(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        if !self.filter.enabled {
            return candidates;
        }

        // A single candidate degrades gracefully: std_dev is zero, the
        // threshold equals its own base score, and it survives
        let n = candidates.len() as f32;
        let mean: f32 = candidates.iter().map(|c| c.base_score).sum::<f32>() / n;
        let variance: f32 = candidates
            .iter()
            .map(|c| (c.base_score - mean).powi(2))
            .sum::<f32>()
            / n;
        let std_dev = variance.sqrt();

        let multiplier = if !self.filter.distribution_adaptive {
            self.filter.std_multiplier
        } else if std_dev < self.filter.tight_cluster_std_threshold {
            self.filter.tight_cluster_multiplier
        } else if std_dev > self.filter.wide_spread_std_threshold {
            self.filter.wide_spread_multiplier
        } else {
            self.filter.std_multiplier
        };

        let threshold = self
            .filter
            .min_absolute_threshold
            .max(mean - multiplier * std_dev);
        debug!(mean, std_dev, threshold, "semantic threshold computed");

        let before = candidates.len();
        let kept: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.base_score >= threshold)
            .collect();
        if kept.len() < before {
            debug!(dropped = before - kept.len(), "semantic threshold filter");
        }
        kept
    }

    /// Fraction of semantic terms appearing as whole words in the title,
    /// scaled by the configured maximum.
    fn title_term_boost(&self, candidate: &Candidate, parsed: &ParsedQuery) -> f32 {
        if !self.config.title_boost_enabled || parsed.semantic_terms.is_empty() {
            return 0.0;
        }
        let matched = parsed
            .semantic_terms
            .iter()
            .filter(|term| contains_whole_word(&candidate.title, term))
            .count();
        (matched as f32 / parsed.semantic_terms.len() as f32) * self.config.title_boost_max
    }

    /// Binary phrase-presence tiers; the first applicable tier wins.
    fn phrase_presence_boost(
        &self,
        candidate: &Candidate,
        parsed: &ParsedQuery,
        phrases: &[String],
    ) -> f32 {
        let tiers = &self.config.phrase_presence_boost;
        if !tiers.enabled {
            return 0.0;
        }

        if phrases
            .iter()
            .any(|p| contains_phrase(&candidate.title, p))
        {
            return tiers.in_title;
        }
        if let Some(text) = &candidate.text {
            if phrases.iter().any(|p| contains_phrase(text, p)) {
                return tiers.in_content;
            }
        }
        if parsed.semantic_terms.len() >= 2
            && parsed
                .semantic_terms
                .iter()
                .all(|term| contains_whole_word(&candidate.title, term))
        {
            return tiers.all_terms_in_title;
        }
        0.0
    }

    /// Log-saturated keyword density over the candidate text, with log
    /// length normalization so long comprehensive articles are not
    /// disproportionately penalized. The observed hit count is recorded for
    /// the discovery signal even when the score contribution is disabled;
    /// only the boost itself gates on `keyword_boost_enabled`.
    fn keyword_frequency_boost(&self, candidate: &mut Candidate, parsed: &ParsedQuery) -> f32 {
        let Some(text) = &candidate.text else {
            return 0.0;
        };
        let terms: Vec<&String> = parsed
            .semantic_terms
            .iter()
            .take(self.config.keyword_max_query_terms)
            .collect();
        if terms.is_empty() {
            return 0.0;
        }

        let hits: u32 = terms.iter().map(|t| count_whole_word(text, t)).sum();
        candidate.keyword_hits = Some(hits);
        if !self.config.keyword_boost_enabled || hits == 0 {
            return 0.0;
        }

        let word_count = candidate.word_count.max(1) as f32;
        let normalizer = match self.config.keyword_length_normalization {
            LengthNormalization::Log => (word_count + self.config.keyword_log_base_offset).ln(),
            LengthNormalization::Linear => word_count,
        };
        let density = hits as f32 / normalizer * self.config.keyword_density_scale;
        (self.config.keyword_boost_scale * (1.0 + density).ln()).min(self.config.keyword_boost_max)
    }

    /// Rewards conceptually related candidates that lack literal term
    /// overlap. Only candidates the keyword stage examined are eligible.
    fn semantic_discovery_boost(&self, candidate: &Candidate) -> f32 {
        let discovery = &self.config.semantic_discovery_boost;
        if !discovery.enabled {
            return 0.0;
        }
        match candidate.keyword_hits {
            Some(hits)
                if hits <= discovery.max_keyword_hits
                    && candidate.base_score >= discovery.min_semantic_score =>
            {
                discovery.boost
            }
            _ => 0.0,
        }
    }

    /// Additive recency tiers; at most one applies.
    fn recency_boost(&self, candidate: &Candidate, now: DateTime<Utc>) -> f32 {
        let recency = &self.config.recency_boost;
        if !recency.enabled {
            return 0.0;
        }
        let Some(published) = candidate.published_date else {
            return 0.0;
        };
        let age_days = (now - published).num_days();
        if age_days < 0 {
            return 0.0;
        }
        match age_days {
            0..=7 => recency.within_7_days,
            8..=30 => recency.within_30_days,
            31..=90 => recency.within_90_days,
            91..=365 => recency.within_1_year,
            366..=1095 => recency.within_3_years,
            _ => 0.0,
        }
    }

    /// Longer queries trust semantic similarity more and keyword/title
    /// signals less. Monotonically non-increasing in the term count.
    pub fn query_length_multiplier(&self, semantic_term_count: usize) -> f32 {
        let scaling = &self.config.query_length_scaling;
        if semantic_term_count <= scaling.short_terms {
            1.0
        } else if semantic_term_count <= scaling.medium_terms {
            scaling.medium_multiplier
        } else {
            scaling.long_multiplier
        }
    }
}

/// Phrases the presence boost checks: explicit exact phrases plus the full
/// joined semantic query when it has at least two tokens.
fn candidate_phrases(parsed: &ParsedQuery) -> Vec<String> {
    let mut phrases = parsed.exact_phrases.clone();
    if parsed.semantic_terms.len() >= 2 {
        phrases.push(parsed.semantic_terms.join(" "));
    }
    phrases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;
    use chrono::TimeZone;

    fn config() -> RerankingConfig {
        RerankingConfig::default()
    }

    fn no_filter() -> SemanticFilterConfig {
        SemanticFilterConfig {
            enabled: false,
            ..SemanticFilterConfig::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
    }

    fn candidate(doc_id: &str, article_id: i64, base: f32) -> Candidate {
        Candidate::new(doc_id.to_string(), article_id, base)
    }

    #[test]
    fn title_term_boost_scales_with_matched_fraction() {
        let reranker = Reranker::new(config(), no_filter());
        let parsed = parse_query("permanent revolution").unwrap();

        let mut full = candidate("a_1", 1, 0.5);
        full.title = "Permanent Revolution Today".to_string();
        let mut half = candidate("a_2", 2, 0.5);
        half.title = "The Revolution Betrayed".to_string();
        let mut none = candidate("a_3", 3, 0.5);
        none.title = "On Agriculture".to_string();

        let results = reranker.rerank(vec![full, half, none], &parsed, now());
        assert_eq!(results[0].article_id, 1);
        // Full title match also earns the joined-terms phrase tier
        assert!(results[0].score >= 0.5 + 0.08 + 0.08 - 1e-6);
        assert_eq!(results[1].article_id, 2);
        assert!((results[1].score - (0.5 + 0.04)).abs() < 1e-6);
        assert_eq!(results[2].article_id, 3);
        assert!((results[2].score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn phrase_presence_prefers_title_over_content() {
        let reranker = Reranker::new(config(), no_filter());
        let parsed = parse_query("\"permanent revolution\"").unwrap();

        let mut in_title = candidate("a_1", 1, 0.5);
        in_title.title = "Permanent Revolution Today".to_string();
        in_title.text = Some("Unrelated body".to_string());

        let mut in_content = candidate("a_2", 2, 0.5);
        in_content.title = "Another Piece".to_string();
        in_content.text = Some("A study of permanent revolution in context".to_string());

        let results = reranker.rerank(vec![in_title, in_content], &parsed, now());
        assert!((results[0].score - 0.58).abs() < 1e-6);
        assert!((results[1].score - 0.56).abs() < 1e-6);
    }

    #[test]
    fn keyword_boost_is_clamped_and_counts_whole_words() {
        let reranker = Reranker::new(config(), no_filter());
        let parsed = parse_query("revolution").unwrap();

        let mut dense = candidate("a_1", 1, 0.4);
        dense.title = "Untitled".to_string();
        dense.text = Some("revolution ".repeat(500));
        dense.word_count = 500;

        let results = reranker.rerank(vec![dense], &parsed, now());
        assert!(results[0].keyword_hits.unwrap() == 500);
        // base + clamped keyword max at most
        assert!(results[0].score <= 0.4 + 0.06 + 1e-6);
        assert!(results[0].score > 0.4);
    }

    #[test]
    fn keyword_stage_skips_candidates_beyond_top_n() {
        let mut cfg = config();
        cfg.keyword_rerank_top_n = 1;
        let reranker = Reranker::new(cfg, no_filter());
        let parsed = parse_query("revolution").unwrap();

        let mut first = candidate("a_1", 1, 0.9);
        first.text = Some("revolution everywhere".to_string());
        first.word_count = 2;
        let mut second = candidate("a_2", 2, 0.1);
        second.text = Some("revolution everywhere".to_string());
        second.word_count = 2;

        let results = reranker.rerank(vec![second, first], &parsed, now());
        assert_eq!(results[0].article_id, 1);
        assert!(results[0].keyword_hits.is_some());
        assert!(results[1].keyword_hits.is_none());
    }

    #[test]
    fn semantic_discovery_rewards_low_overlap_high_similarity() {
        let reranker = Reranker::new(config(), no_filter());
        let parsed = parse_query("alienation").unwrap();

        let mut related = candidate("a_1", 1, 0.85);
        related.title = "Estranged Labour".to_string();
        related.text = Some("a text with no literal query overlap".to_string());
        related.word_count = 7;

        let mut overlapping = candidate("a_2", 2, 0.85);
        overlapping.title = "On Alienation".to_string();
        overlapping.text = Some("alienation alienation alienation explained".to_string());
        overlapping.word_count = 4;

        let results = reranker.rerank(vec![related.clone(), overlapping], &parsed, now());
        let related_result = results.iter().find(|c| c.article_id == 1).unwrap();
        let overlap_result = results.iter().find(|c| c.article_id == 2).unwrap();
        assert_eq!(related_result.keyword_hits, Some(0));
        // related gets the discovery bonus and nothing else
        assert!((related_result.score - (0.85 + 0.025)).abs() < 1e-6);
        // overlapping candidate got keyword/title boosts instead
        assert!(overlap_result.keyword_hits.unwrap() >= 3);
        assert!(overlap_result.score > 0.85);
    }

    #[test]
    fn discovery_boost_survives_keyword_boost_rollback() {
        let mut cfg = config();
        cfg.keyword_boost_enabled = false;
        assert!(cfg.semantic_discovery_boost.enabled);
        let reranker = Reranker::new(cfg, no_filter());
        let parsed = parse_query("alienation").unwrap();

        let mut related = candidate("a_1", 1, 0.85);
        related.title = "Estranged Labour".to_string();
        related.text = Some("a text with no literal query overlap".to_string());
        related.word_count = 7;

        let mut overlapping = candidate("a_2", 2, 0.85);
        overlapping.title = "Unrelated Title".to_string();
        overlapping.text = Some("alienation alienation alienation explained".to_string());
        overlapping.word_count = 4;

        let results = reranker.rerank(vec![related, overlapping], &parsed, now());
        let related_result = results.iter().find(|c| c.article_id == 1).unwrap();
        let overlap_result = results.iter().find(|c| c.article_id == 2).unwrap();

        // Hits are still observed with the keyword score rolled back, so
        // the discovery bonus applies on its own flag
        assert_eq!(related_result.keyword_hits, Some(0));
        assert!((related_result.score - (0.85 + 0.025)).abs() < 1e-6);
        // High-overlap candidate gets neither signal
        assert_eq!(overlap_result.keyword_hits, Some(3));
        assert!((overlap_result.score - 0.85).abs() < 1e-6);
    }

    #[test]
    fn recency_tiers_apply_exactly_one_boost() {
        let reranker = Reranker::new(config(), no_filter());
        let parsed = parse_query("economy").unwrap();
        let now = now();

        let cases = [
            (3, 0.07),
            (20, 0.05),
            (60, 0.03),
            (200, 0.02),
            (800, 0.01),
            (2000, 0.0),
        ];
        for (age_days, expected) in cases {
            let mut c = candidate("a_1", 1, 0.5);
            c.published_date = Some(now - chrono::Duration::days(age_days));
            let results = reranker.rerank(vec![c], &parsed, now);
            assert!(
                (results[0].score - (0.5 + expected)).abs() < 1e-6,
                "age {age_days} expected boost {expected}"
            );
        }
    }

    #[test]
    fn query_length_multiplier_is_monotonically_non_increasing() {
        let reranker = Reranker::new(config(), no_filter());
        let mut previous = f32::INFINITY;
        for terms in 0..10 {
            let multiplier = reranker.query_length_multiplier(terms);
            assert!(multiplier <= previous);
            previous = multiplier;
        }
        assert_eq!(reranker.query_length_multiplier(3), 1.0);
        assert_eq!(reranker.query_length_multiplier(4), 0.5);
        assert_eq!(reranker.query_length_multiplier(5), 0.25);
    }

    #[test]
    fn long_queries_scale_down_all_boosts() {
        let reranker = Reranker::new(config(), no_filter());
        let short = parse_query("revolution").unwrap();
        let long = parse_query("revolution history europe crisis capital theory").unwrap();

        let make = || {
            let mut c = candidate("a_1", 1, 0.5);
            c.title = "Revolution".to_string();
            c
        };
        let short_score = reranker.rerank(vec![make()], &short, now())[0].score;
        let long_score = reranker.rerank(vec![make()], &long, now())[0].score;
        assert!(short_score > long_score);
    }

    #[test]
    fn outlier_below_distribution_threshold_is_dropped() {
        let filter = SemanticFilterConfig {
            min_absolute_threshold: 0.0,
            ..SemanticFilterConfig::default()
        };
        let reranker = Reranker::new(config(), filter);
        let parsed = parse_query("economy").unwrap();

        // Cluster around 0.5 with one outlier far below mean - m * std
        let mut candidates: Vec<Candidate> = (0..11)
            .map(|i| candidate(&format!("a_{i}"), i, 0.5 + (i as f32) * 0.001))
            .collect();
        candidates.push(candidate("a_99", 99, 0.30));
        let results = reranker.rerank(candidates, &parsed, now());
        assert_eq!(results.len(), 11);
        assert!(results.iter().all(|c| c.article_id != 99));
    }

    #[test]
    fn wide_spread_keeps_more_candidates() {
        let filter = SemanticFilterConfig {
            min_absolute_threshold: 0.0,
            ..SemanticFilterConfig::default()
        };
        let reranker = Reranker::new(config(), filter);
        let parsed = parse_query("economy").unwrap();

        // Wide spread: scores from 0.1 to 0.9; threshold = mean - 2.5 * std
        // admits everything
        let candidates: Vec<Candidate> = (0..12)
            .map(|i| candidate(&format!("a_{i}"), i, 0.1 + (i as f32) * 0.07))
            .collect();
        let results = reranker.rerank(candidates, &parsed, now());
        assert_eq!(results.len(), 12);
    }

    #[test]
    fn min_absolute_threshold_always_applies() {
        let filter = SemanticFilterConfig {
            min_absolute_threshold: 0.25,
            ..SemanticFilterConfig::default()
        };
        let reranker = Reranker::new(config(), filter);
        let parsed = parse_query("economy").unwrap();
        let results = reranker.rerank(
            vec![candidate("a_1", 1, 0.2), candidate("a_2", 2, 0.6)],
            &parsed,
            now(),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].article_id, 2);
    }

    #[test]
    fn distribution_threshold_applies_below_ten_candidates() {
        let filter = SemanticFilterConfig {
            min_absolute_threshold: 0.0,
            ..SemanticFilterConfig::default()
        };
        let reranker = Reranker::new(config(), filter);
        let parsed = parse_query("economy").unwrap();

        // Tight three-candidate cluster: std_dev ~0.047, threshold
        // mean - 1.0 * std ~0.42, so the 0.40 straggler is discarded
        let results = reranker.rerank(
            vec![
                candidate("a_1", 1, 0.50),
                candidate("a_2", 2, 0.50),
                candidate("a_3", 3, 0.40),
            ],
            &parsed,
            now(),
        );
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|c| c.article_id != 3));
    }

    #[test]
    fn single_candidate_survives_distribution_threshold() {
        let filter = SemanticFilterConfig {
            min_absolute_threshold: 0.0,
            ..SemanticFilterConfig::default()
        };
        let reranker = Reranker::new(config(), filter);
        let parsed = parse_query("economy").unwrap();

        // With one candidate std_dev is zero and the threshold collapses to
        // its own base score
        let results = reranker.rerank(vec![candidate("a_1", 1, 0.05)], &parsed, now());
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn rerank_is_idempotent() {
        let reranker = Reranker::new(config(), no_filter());
        let parsed = parse_query("permanent revolution").unwrap();
        let now = now();

        let mut a = candidate("a_1", 1, 0.6);
        a.title = "Permanent Revolution Today".to_string();
        a.text = Some("the theory of permanent revolution".to_string());
        a.word_count = 5;
        a.published_date = Some(now - chrono::Duration::days(10));
        let mut b = candidate("c_2_0", 2, 0.55);
        b.title = "Unrelated".to_string();
        b.text = Some("nothing in common".to_string());
        b.word_count = 3;

        let once = reranker.rerank(vec![a, b], &parsed, now);
        let twice = reranker.rerank(once.clone(), &parsed, now);
        assert_eq!(once.len(), twice.len());
        for (first, second) in once.iter().zip(twice.iter()) {
            assert_eq!(first.doc_id, second.doc_id);
            assert!((first.score - second.score).abs() < 1e-6);
        }
    }

    #[test]
    fn ties_break_by_date_then_article_id() {
        let mut cfg = config();
        cfg.recency_boost.enabled = false;
        let reranker = Reranker::new(cfg, no_filter());
        let parsed = parse_query("economy").unwrap();
        let now = now();

        let mut older = candidate("a_1", 1, 0.5);
        older.published_date = Some(now - chrono::Duration::days(4000));
        let mut newer = candidate("a_2", 2, 0.5);
        newer.published_date = Some(now - chrono::Duration::days(3000));

        let results = reranker.rerank(vec![older, newer], &parsed, now);
        assert_eq!(results[0].article_id, 2);
        assert_eq!(results[1].article_id, 1);
    }

    #[test]
    fn disabled_signals_contribute_nothing() {
        let mut cfg = config();
        cfg.title_boost_enabled = false;
        cfg.keyword_boost_enabled = false;
        cfg.phrase_presence_boost.enabled = false;
        cfg.semantic_discovery_boost.enabled = false;
        cfg.recency_boost.enabled = false;
        let reranker = Reranker::new(cfg, no_filter());
        let parsed = parse_query("permanent revolution").unwrap();

        let mut c = candidate("a_1", 1, 0.5);
        c.title = "Permanent Revolution Today".to_string();
        c.text = Some("permanent revolution everywhere".to_string());
        c.word_count = 3;
        c.published_date = Some(now() - chrono::Duration::days(1));

        let results = reranker.rerank(vec![c], &parsed, now());
        assert!((results[0].score - 0.5).abs() < 1e-6);
    }
}
