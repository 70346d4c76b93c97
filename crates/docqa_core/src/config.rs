//! Layered configuration.
//!
//! Built-in defaults are merged with `docqa.toml` and then with `DOCQA_*`
//! environment variables (nested keys use `__`, e.g.
//! `DOCQA_GENERATOR__MODEL=llama3.1`).

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_CONFIG_FILE: &str = "docqa.toml";
pub const ENV_PREFIX: &str = "DOCQA_";
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

const DEFAULT_PRIMARY_PROMPT: &str = r#"You are a technical consultant answering questions from a document knowledge base.

Rules:
1) Use ONLY the information in the context below. Do not invent facts.
2) Quote exact figures (weights, sizes, ratings, part numbers) when the context has them.
3) If the context does not contain the answer, say so plainly.
4) Name the source of the facts you use.

Context:
{context}

Use this context to give an accurate, well-structured answer."#;

const DEFAULT_FALLBACK_PROMPT: &str = r#"You are a technical consultant. The knowledge base has no information on this question.
If the question is about the documented products, apologise and ask the user to upload the relevant documents.
If it is a general question you may answer it, but make clear that the answer does not come from the documents."#;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Keyword,
    Dense,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Keyword => "keyword",
            BackendKind::Dense => "dense",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.1".to_string(),
            timeout_secs: 60,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// System instruction used when retrieval found context. Must contain
    /// exactly one `{context}` placeholder.
    pub primary: String,
    /// System instruction used on the fallback path.
    pub fallback: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PRIMARY_PROMPT.to_string(),
            fallback: DEFAULT_FALLBACK_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/documents`.
    pub documents_dir: Option<PathBuf>,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters carried over from the end of one chunk into the next.
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Number of most recent conversation messages forwarded to the generator.
    pub history_window: usize,
    pub backend: BackendKind,
    pub generator: GeneratorConfig,
    pub embeddings: EmbeddingsConfig,
    pub prompts: PromptConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            documents_dir: None,
            chunk_size: 1500,
            chunk_overlap: 300,
            top_k: 5,
            history_window: 6,
            backend: BackendKind::Keyword,
            generator: GeneratorConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            prompts: PromptConfig::default(),
        }
    }
}

impl RagConfig {
    /// Load from `docqa.toml` in the working directory plus the environment.
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load from an explicit TOML file plus the environment. A missing file is
    /// not an error; defaults and environment still apply.
    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let figment = Figment::from(Serialized::defaults(RagConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, AppError> {
        let cfg: RagConfig = figment.extract().map_err(|e| {
            AppError::config("Failed to read configuration").with_details(e.to_string())
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::config("chunk_overlap must be smaller than chunk_size")
                .with_details(format!(
                    "chunk_size={}; chunk_overlap={}",
                    self.chunk_size, self.chunk_overlap
                )));
        }
        if self.top_k == 0 {
            return Err(AppError::config("top_k must be at least 1"));
        }
        if self.generator.timeout_secs == 0 || self.embeddings.timeout_secs == 0 {
            return Err(AppError::config("timeout_secs must be at least 1"));
        }
        let placeholders = self.prompts.primary.matches(CONTEXT_PLACEHOLDER).count();
        if placeholders != 1 {
            return Err(AppError::config(
                "Primary prompt must contain exactly one {context} placeholder",
            )
            .with_details(format!("found={placeholders}")));
        }
        Ok(())
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.documents_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("documents"))
    }
}
