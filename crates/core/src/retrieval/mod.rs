//! Semantic retrieval over restaurant documents.
//!
//! - [`chunker`] splits source text into overlapping fixed-size windows.
//! - [`embedder`] defines the embedding collaborator plus a deterministic local embedder.
//! - [`index`] holds the immutable [`RetrievalIndex`] and its nearest-neighbor query.
//! - [`knowledge_base`] owns the current index and swaps rebuilt indexes in atomically.
//! - [`documents`] reads a directory of text documents into [`SourceDocument`]s.

pub mod chunker;
pub mod documents;
pub mod embedder;
pub mod index;
pub mod knowledge_base;

use thiserror::Error;

pub use chunker::{ChunkingConfig, TextWindow};
pub use documents::{load_document, load_documents, SourceDocument};
pub use embedder::{Embedder, HashingEmbedder};
pub use index::{
    DocumentChunk, IndexSummary, RetrievalIndex, ScoredChunk, DEFAULT_EMBED_BATCH_SIZE,
};
pub use knowledge_base::KnowledgeBase;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("no documents with extractable text were supplied")]
    EmptyCorpus,
    #[error("knowledge base index has not been built")]
    NotReady,
    #[error("invalid chunking configuration: {0}")]
    InvalidChunking(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("document source failure: {0}")]
    DocumentSource(String),
    #[error("index build {generation} was superseded by a newer rebuild")]
    Superseded { generation: u64 },
}
