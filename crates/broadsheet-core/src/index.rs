//! Exact-scan vector index.
//!
//! Embeddings are held in a single row-major matrix of L2-normalized
//! vectors with parallel doc-id and metadata arrays; cosine similarity is a
//! dot product over normalized rows. At ~16k articles producing ~30k
//! documents a full scan is fast and, unlike ANN structures, survives
//! incremental upserts and deletions without drift.
//!
//! The index stores no document content, only vectors and a small
//! metadata dictionary per document. Full text lives in the article store
//! and is fetched on demand.
//!
//! Persistence is two artifacts in one directory: `vectors.bin`
//! (little-endian f32 matrix behind a count/dimension header) and
//! `metadata.json` (row-ordered doc ids and metadata). `save` followed by
//! `load` round-trips exactly.

use crate::error::IndexError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

const VECTORS_FILE: &str = "vectors.bin";
const METADATA_FILE: &str = "metadata.json";

/// Metadata stored alongside each vector document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub article_id: i64,
    pub title: String,
    pub source: String,
    pub author: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub is_chunk: bool,
    /// Zero for whole-article documents
    pub chunk_index: u32,
}

/// On-disk metadata artifact: dimension plus row-ordered documents.
#[derive(Debug, Serialize, Deserialize)]
struct IndexManifest {
    dimension: usize,
    documents: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    id: String,
    #[serde(flatten)]
    metadata: DocMetadata,
}

/// In-memory exact-scan vector index keyed by stable string ids.
pub struct VectorIndex {
    dimension: usize,
    /// Row-major matrix of L2-normalized vectors
    vectors: Vec<f32>,
    doc_ids: Vec<String>,
    metadata: Vec<DocMetadata>,
    /// doc id -> row number
    positions: HashMap<String, usize>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            doc_ids: Vec::new(),
            metadata: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of documents in the index.
    pub fn count(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Inserts or replaces the document with this id. Idempotent: the same
    /// id always occupies exactly one row.
    pub fn upsert(
        &mut self,
        doc_id: &str,
        metadata: DocMetadata,
        vector: Vec<f32>,
    ) -> Result<(), IndexError> {
        self.validate_dimension(vector.len())?;
        let mut vector = vector;
        normalize_in_place(&mut vector);

        if let Some(&row) = self.positions.get(doc_id) {
            let offset = row * self.dimension;
            self.vectors[offset..offset + self.dimension].copy_from_slice(&vector);
            self.metadata[row] = metadata;
        } else {
            let row = self.doc_ids.len();
            self.vectors.extend_from_slice(&vector);
            self.doc_ids.push(doc_id.to_string());
            self.metadata.push(metadata);
            self.positions.insert(doc_id.to_string(), row);
        }
        Ok(())
    }

    /// Removes the document with this id. Idempotent: removing an absent id
    /// is a no-op. The last row is swapped into the hole.
    pub fn delete(&mut self, doc_id: &str) -> bool {
        let Some(row) = self.positions.remove(doc_id) else {
            return false;
        };
        let last = self.doc_ids.len() - 1;
        if row != last {
            let (head, tail) = self.vectors.split_at_mut(last * self.dimension);
            head[row * self.dimension..(row + 1) * self.dimension]
                .copy_from_slice(&tail[..self.dimension]);
            self.doc_ids.swap(row, last);
            self.metadata.swap(row, last);
            self.positions.insert(self.doc_ids[row].clone(), row);
        }
        self.vectors.truncate(last * self.dimension);
        self.doc_ids.pop();
        self.metadata.pop();
        true
    }

    /// Top-k cosine search. Scores are in `[-1, 1]`, descending; ties break
    /// on ascending doc id for determinism.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, IndexError> {
        self.validate_dimension(query.len())?;
        if self.doc_ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        normalize_in_place(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, v)| (row, dot(&query, v)))
            .collect();
        scored.sort_unstable_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.doc_ids[a.0].cmp(&self.doc_ids[b.0]))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(row, score)| (self.doc_ids[row].clone(), score))
            .collect())
    }

    /// Metadata for a document id, if present.
    pub fn metadata(&self, doc_id: &str) -> Option<&DocMetadata> {
        self.positions.get(doc_id).map(|&row| &self.metadata[row])
    }

    /// All document ids belonging to an article (the whole-article document
    /// and any chunks). Used by incremental updates to clear an article
    /// before reinserting it.
    pub fn document_ids_for_article(&self, article_id: i64) -> Vec<String> {
        self.metadata
            .iter()
            .enumerate()
            .filter(|(_, m)| m.article_id == article_id)
            .map(|(row, _)| self.doc_ids[row].clone())
            .collect()
    }

    /// Deletes every document belonging to an article. Returns how many
    /// documents were removed.
    pub fn delete_article(&mut self, article_id: i64) -> usize {
        let ids = self.document_ids_for_article(article_id);
        let mut removed = 0;
        for id in ids {
            if self.delete(&id) {
                removed += 1;
            }
        }
        removed
    }

    /// Persists the index to a directory.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir).map_err(|e| IndexError::Io(e.to_string()))?;

        let mut buf = Vec::with_capacity(16 + self.vectors.len() * 4);
        buf.extend_from_slice(&(self.doc_ids.len() as u64).to_le_bytes());
        buf.extend_from_slice(&(self.dimension as u64).to_le_bytes());
        for value in &self.vectors {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        let mut file = fs::File::create(dir.join(VECTORS_FILE))
            .map_err(|e| IndexError::Io(e.to_string()))?;
        file.write_all(&buf)
            .map_err(|e| IndexError::Io(e.to_string()))?;

        let manifest = IndexManifest {
            dimension: self.dimension,
            documents: self
                .doc_ids
                .iter()
                .zip(self.metadata.iter())
                .map(|(id, metadata)| ManifestEntry {
                    id: id.clone(),
                    metadata: metadata.clone(),
                })
                .collect(),
        };
        let json = serde_json::to_vec(&manifest)
            .map_err(|e| IndexError::Serialization(e.to_string()))?;
        fs::write(dir.join(METADATA_FILE), json).map_err(|e| IndexError::Io(e.to_string()))?;

        info!(documents = self.count(), path = %dir.display(), "saved vector index");
        Ok(())
    }

    /// Loads an index from a directory written by [`save`](Self::save).
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let json = fs::read(dir.join(METADATA_FILE)).map_err(|e| IndexError::Io(e.to_string()))?;
        let manifest: IndexManifest =
            serde_json::from_slice(&json).map_err(|e| IndexError::Serialization(e.to_string()))?;

        let mut file =
            fs::File::open(dir.join(VECTORS_FILE)).map_err(|e| IndexError::Io(e.to_string()))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| IndexError::Io(e.to_string()))?;

        if buf.len() < 16 {
            return Err(IndexError::Corrupt("vectors file truncated".to_string()));
        }
        let count = u64::from_le_bytes(buf[0..8].try_into().expect("slice length checked")) as usize;
        let dimension =
            u64::from_le_bytes(buf[8..16].try_into().expect("slice length checked")) as usize;

        if dimension != manifest.dimension {
            return Err(IndexError::Corrupt(format!(
                "dimension mismatch between artifacts: {} vs {}",
                dimension, manifest.dimension
            )));
        }
        if count != manifest.documents.len() {
            return Err(IndexError::Corrupt(format!(
                "document count mismatch between artifacts: {} vs {}",
                count,
                manifest.documents.len()
            )));
        }
        let expected_len = 16 + count * dimension * 4;
        if buf.len() != expected_len {
            return Err(IndexError::Corrupt(format!(
                "vectors file has {} bytes, expected {expected_len}",
                buf.len()
            )));
        }

        let vectors: Vec<f32> = buf[16..]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let mut doc_ids = Vec::with_capacity(count);
        let mut metadata = Vec::with_capacity(count);
        let mut positions = HashMap::with_capacity(count);
        for (row, entry) in manifest.documents.into_iter().enumerate() {
            positions.insert(entry.id.clone(), row);
            doc_ids.push(entry.id);
            metadata.push(entry.metadata);
        }

        debug!(documents = count, dimension, path = %dir.display(), "loaded vector index");
        Ok(Self {
            dimension,
            vectors,
            doc_ids,
            metadata,
            positions,
        })
    }

    fn validate_dimension(&self, actual: usize) -> Result<(), IndexError> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scales a vector to unit length. Zero vectors are left untouched and
/// score zero against everything.
fn normalize_in_place(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in v.iter_mut() {
            *value /= norm;
        }
    }
}
