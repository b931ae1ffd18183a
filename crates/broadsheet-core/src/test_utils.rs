//! Shared fixtures for unit and integration tests.
//!
//! The hashing embedder makes the full pipeline testable without model
//! weights: token hashes are accumulated into a fixed number of buckets
//! and L2-normalized, so texts sharing vocabulary score higher cosine
//! similarity than unrelated texts, deterministically.

use crate::embedding::Embedder;
use crate::error::EmbeddingError;
use crate::store::NewArticle;
use crate::text::tokenize;
use chrono::{DateTime, TimeZone, Utc};
use std::hash::{Hash, Hasher};

/// Deterministic bag-of-words embedder for tests.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimension];
                for token in tokenize(text) {
                    let mut hasher = std::collections::hash_map::DefaultHasher::new();
                    token.hash(&mut hasher);
                    let bucket = (hasher.finish() % self.dimension as u64) as usize;
                    vector[bucket] += 1.0;
                }
                let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for value in &mut vector {
                        *value /= norm;
                    }
                }
                vector
            })
            .collect())
    }
}

/// A fixed publication date for deterministic fixtures.
pub fn fixed_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

/// A minimal article fixture; tests mutate fields as needed.
pub fn article_with_content(url: &str, title: &str, content: &str) -> NewArticle {
    NewArticle {
        url: url.to_string(),
        guid: Some(format!("guid:{url}")),
        title: title.to_string(),
        content: content.to_string(),
        summary: None,
        source: "Test Source".to_string(),
        author: None,
        published_date: fixed_date(),
        fetched_date: fixed_date(),
        terms: vec![],
        tags: vec![],
    }
}
