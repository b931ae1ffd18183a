//! Error types for broadsheet-core.
//!
//! Each subsystem has its own error enum; everything converges into
//! [`SearchError`], the closed sum the engine returns to callers. A response
//! carries either results or a single error kind, never both.

use thiserror::Error;

/// Errors from the article store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying redb failure (open, transaction, table access)
    #[error("database error: {0}")]
    Database(String),
    /// Record failed to serialize or deserialize
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Referenced article does not exist
    #[error("article {0} not found")]
    ArticleNotFound(i64),
}

/// Errors from the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Persistence I/O failure
    #[error("index io error: {0}")]
    Io(String),
    /// Metadata artifact failed to serialize or deserialize
    #[error("index serialization error: {0}")]
    Serialization(String),
    /// On-disk artifacts are missing or structurally invalid
    #[error("index corrupt: {0}")]
    Corrupt(String),
    /// Vector dimension does not match the index
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors from embedding inference.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// Failed to load model weights or configuration
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    /// Failed to tokenize input text
    #[error("tokenization failed: {0}")]
    Tokenization(String),
    /// Failed to create a tensor during inference
    #[error("failed to create tensor: {0}")]
    TensorCreation(String),
    /// Forward pass through the model failed
    #[error("inference failed: {0}")]
    Inference(String),
    /// Invalid model configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors from the indexing service. Per-article failures are logged and
/// skipped inside the service; these variants abort a whole build/update run.
#[derive(Debug, Error)]
pub enum IndexingError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Top-level error kind returned by the search engine.
///
/// None of these are fatal to the process: the engine returns the error and
/// stays ready for the next request.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Query exceeded the maximum length
    #[error("query too long (max {max} characters)")]
    QueryTooLong { max: usize },
    /// Filter specification failed validation
    #[error("malformed filter: {0}")]
    MalformedFilter(String),
    /// Vector document id did not parse
    #[error("malformed document id: {0}")]
    MalformedId(String),
    /// Vector index is missing, unloaded, or failed mid-query
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),
    /// Article store is missing or failed mid-query
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// A candidate from the index has no corresponding article row.
    /// Mismatches are logged and the candidate dropped; this variant exists
    /// for callers that surface the condition directly.
    #[error("index/store mismatch for document {doc_id}")]
    IndexStoreMismatch { doc_id: String },
    /// Query exceeded the hard time budget
    #[error("query timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },
    /// Request queue is full
    #[error("request queue full")]
    Overloaded,
    /// Query embedding failed
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

impl From<StoreError> for SearchError {
    fn from(err: StoreError) -> Self {
        SearchError::StoreUnavailable(err.to_string())
    }
}

impl From<IndexError> for SearchError {
    fn from(err: IndexError) -> Self {
        SearchError::IndexUnavailable(err.to_string())
    }
}
