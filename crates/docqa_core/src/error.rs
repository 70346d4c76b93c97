use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes shared by every docqa layer.
///
/// Retrieval and generation failures never reach an end user; the query
/// orchestrator turns them into a fallback answer. The remaining codes surface
/// to whoever drives ingestion or configuration.
pub mod codes {
    pub const INGESTION_FAILED: &str = "RAG_INGESTION_FAILED";
    pub const INDEX_CORRUPT: &str = "RAG_INDEX_CORRUPT";
    pub const INDEX_WRITE_FAILED: &str = "RAG_INDEX_WRITE_FAILED";
    pub const RETRIEVAL_FAILED: &str = "RAG_RETRIEVAL_FAILED";
    pub const GENERATION_FAILED: &str = "RAG_GENERATION_FAILED";
    pub const CONFIG_INVALID: &str = "RAG_CONFIG_INVALID";
}

/// Single structured error shape used across the chunking, index, retrieval
/// and generation layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn ingestion(message: impl Into<String>) -> Self {
        Self::new(codes::INGESTION_FAILED, message)
    }

    pub fn index_corrupt(message: impl Into<String>) -> Self {
        Self::new(codes::INDEX_CORRUPT, message)
    }

    pub fn index_write(message: impl Into<String>) -> Self {
        Self::new(codes::INDEX_WRITE_FAILED, message)
    }

    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::new(codes::RETRIEVAL_FAILED, message)
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::new(codes::GENERATION_FAILED, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(codes::CONFIG_INVALID, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(details) = self.details.as_deref() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}
