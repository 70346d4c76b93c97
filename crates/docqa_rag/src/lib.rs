pub mod answer;
pub mod chunking;
pub mod context;
pub mod embeddings;
pub mod index;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod ollama;
pub mod retrieve;

pub use answer::{Answer, AnswerKind, QueryEngine};
pub use knowledge::KnowledgeBase;
