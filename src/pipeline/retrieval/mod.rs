pub mod embedder;
pub mod knowledge;
pub mod search;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use embedder::{CachedEmbedder, EmbeddingModel, HashingEmbedder, OllamaEmbedder};
pub use knowledge::{KeywordIndex, KnowledgeBase};
pub use search::{citable, Retriever, CITATION_THRESHOLD};
pub use types::{KnowledgeChunk, RankedChunk, RetrievedSource, SafetyFields, SeverityTier};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Knowledge base load failed: {0}")]
    KnowledgeBaseLoad(String),

    #[error("Knowledge file unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Knowledge file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
