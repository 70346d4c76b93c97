use docqa_core::domain::Chunk;
use docqa_core::error::AppError;
use serde::{Deserialize, Serialize};

pub mod dense;
pub mod keyword;
mod similarity;

pub use dense::{DenseBackend, EmbeddingSearch, SimilaritySearch};
pub use keyword::KeywordBackend;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Anything that can rank indexed chunks for a query.
///
/// An empty result is a normal outcome ("nothing matched"). `Err` is reserved
/// for a backend that could not run at all.
pub trait RetrievalBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, AppError>;
}
