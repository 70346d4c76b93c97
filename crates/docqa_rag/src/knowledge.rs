use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use docqa_core::config::{BackendKind, RagConfig};
use docqa_core::error::AppError;

use crate::answer::QueryEngine;
use crate::embeddings::{Embedder, OllamaEmbedder};
use crate::index::{IndexStats, IndexStore};
use crate::ingest::{IngestReport, Ingestor};
use crate::llm::{Generator, OllamaGenerator};
use crate::ollama::OllamaClient;
use crate::retrieve::dense::VECTORS_FILE;
use crate::retrieve::{DenseBackend, EmbeddingSearch, KeywordBackend, RetrievalBackend};

/// Configuration plus the resident index, passed explicitly to whatever needs
/// them. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct KnowledgeBase {
    config: RagConfig,
    store: Arc<IndexStore>,
}

impl KnowledgeBase {
    /// Validate `config` and load the index under `<data_dir>/index`. An
    /// unreadable index starts empty.
    pub fn open(config: RagConfig) -> Result<Self, AppError> {
        config.validate()?;
        let store = Arc::new(IndexStore::open(config.index_dir()));
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<IndexStore> {
        Arc::clone(&self.store)
    }

    pub fn stats(&self) -> IndexStats {
        let index = self.store.snapshot();
        IndexStats {
            total_chunks: index.len(),
            total_sources: index.sources().len(),
            persist_dir: self.store.dir().display().to_string(),
            backend: self.config.backend.as_str().to_string(),
        }
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            self.store(),
            self.config.chunk_size,
            self.config.chunk_overlap,
        )
    }

    /// Index the configured documents directory.
    pub fn ingest_directory(&self, force_reindex: bool) -> Result<IngestReport, AppError> {
        self.ingestor()
            .ingest_directory(&self.config.documents_dir(), force_reindex)
    }

    pub fn ingest_document(&self, source: &str, text: &str) -> Result<usize, AppError> {
        self.ingestor().ingest_document(source, text)
    }

    pub fn ingest_file(&self, path: &Path) -> Result<usize, AppError> {
        self.ingestor().ingest_file(path)
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.store.clear()
    }

    /// Backend picked by `config.backend`; the dense one talks to the
    /// configured Ollama embeddings endpoint.
    pub fn retrieval_backend(&self) -> Result<Arc<dyn RetrievalBackend>, AppError> {
        match self.config.backend {
            BackendKind::Keyword => Ok(Arc::new(KeywordBackend::new(self.store()))),
            BackendKind::Dense => {
                let cfg = &self.config.embeddings;
                let client = OllamaClient::new(&cfg.base_url)?;
                let embedder = OllamaEmbedder::new(client, Duration::from_secs(cfg.timeout_secs));
                Ok(self.dense_backend(Arc::new(embedder)))
            }
        }
    }

    /// Dense backend over an arbitrary embedder, caching vectors next to the
    /// index.
    pub fn dense_backend(&self, embedder: Arc<dyn Embedder>) -> Arc<dyn RetrievalBackend> {
        let search = EmbeddingSearch::new(
            self.store(),
            embedder,
            self.config.embeddings.model.clone(),
        )
        .with_cache_file(self.store.dir().join(VECTORS_FILE));
        Arc::new(DenseBackend::new(search))
    }

    pub fn query_engine(&self, generator: Arc<dyn Generator>) -> Result<QueryEngine, AppError> {
        let backend = self.retrieval_backend()?;
        Ok(QueryEngine::from_config(backend, generator, &self.config))
    }

    /// Query engine wired to the configured Ollama chat model.
    pub fn ollama_query_engine(&self) -> Result<QueryEngine, AppError> {
        let generator = OllamaGenerator::from_config(&self.config.generator)?;
        self.query_engine(Arc::new(generator))
    }
}
