//! Embedding model abstraction.
//!
//! The embedding backend is the single dynamic-dispatch seam in the core:
//! one trait with an `embed` method plus dimension metadata. The indexing
//! service and search engine only depend on [`Embedder`]; which model
//! produces the vectors is configuration.

mod model;

pub use model::BgeEmbedder;

use crate::error::EmbeddingError;

/// Produces dense embedding vectors for texts.
///
/// Implementations must be `Send + Sync`: the search worker pool shares one
/// embedder across threads.
pub trait Embedder: Send + Sync {
    /// The output vector dimension. Every embedding has this length.
    fn dimension(&self) -> usize;

    /// Embeds a batch of texts, one vector per input, in order. Vectors are
    /// L2-normalized so cosine similarity reduces to a dot product.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}
