use docqa_core::error::AppError;

/// Turns text into a dense vector. Implementations must be shareable across
/// query threads.
pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;
}

pub mod ollama_embed;

pub use ollama_embed::OllamaEmbedder;
