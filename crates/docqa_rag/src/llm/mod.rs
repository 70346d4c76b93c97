use docqa_core::domain::Message;
use docqa_core::error::AppError;

/// Produces an answer from ordered role-tagged messages. One call per query.
pub trait Generator: Send + Sync {
    fn generate(&self, messages: &[Message]) -> Result<String, AppError>;
}

pub mod ollama_llm;

pub use ollama_llm::OllamaGenerator;
