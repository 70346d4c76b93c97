use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use docqa_core::domain::Chunk;
use docqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::similarity;
use super::{RetrievalBackend, ScoredChunk};
use crate::embeddings::Embedder;
use crate::index::persist::text_sha256;
use crate::index::IndexStore;

pub const VECTORS_FILE: &str = "vectors.json";

/// A similarity service over the indexed chunks.
///
/// Results come back best first. An empty store yields `Ok(vec![])`.
pub trait SimilaritySearch: Send + Sync {
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<(Chunk, f32)>, AppError>;
}

/// Adapts any [`SimilaritySearch`] to the [`RetrievalBackend`] seam.
#[derive(Debug)]
pub struct DenseBackend<S> {
    inner: S,
}

impl<S: SimilaritySearch> DenseBackend<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: SimilaritySearch> RetrievalBackend for DenseBackend<S> {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        let hits = self.inner.search(query, top_k).map_err(|e| {
            if e.is(codes::RETRIEVAL_FAILED) {
                e
            } else {
                AppError::retrieval("Similarity search failed")
                    .with_details(e.to_string())
                    .with_retryable(e.retryable)
            }
        })?;
        tracing::info!(found = hits.len(), "dense retrieval finished");
        Ok(hits
            .into_iter()
            .take(top_k)
            .map(|(chunk, score)| ScoredChunk { chunk, score })
            .collect())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VectorCacheFile {
    model: String,
    vectors: BTreeMap<String, Vec<f32>>,
}

/// Embedding-backed similarity over the resident index.
///
/// Chunk vectors are cached by the SHA-256 of the chunk text, so chunks that
/// survive a re-ingestion are not embedded again. With a cache file the
/// vectors also survive restarts.
pub struct EmbeddingSearch {
    store: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
    model: String,
    cache: Mutex<BTreeMap<String, Vec<f32>>>,
    cache_path: Option<PathBuf>,
}

impl std::fmt::Debug for EmbeddingSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingSearch")
            .field("model", &self.model)
            .field("cache_path", &self.cache_path)
            .finish_non_exhaustive()
    }
}

impl EmbeddingSearch {
    pub fn new(store: Arc<IndexStore>, embedder: Arc<dyn Embedder>, model: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            model: model.into(),
            cache: Mutex::new(BTreeMap::new()),
            cache_path: None,
        }
    }

    /// Persist vectors to `path`, loading any vectors already stored there for
    /// the same model.
    pub fn with_cache_file(mut self, path: PathBuf) -> Self {
        let loaded = read_cache(&path, &self.model);
        self.cache = Mutex::new(loaded);
        self.cache_path = Some(path);
        self
    }

    pub fn cached_vectors(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Vectors for `chunks`, in order, embedding whatever the cache lacks.
    fn chunk_vectors(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, AppError> {
        let keys: Vec<String> = chunks.iter().map(|c| text_sha256(&c.text)).collect();

        let missing: Vec<(String, &str)> = {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            let mut seen = HashSet::new();
            keys.iter()
                .zip(chunks)
                .filter(|(k, _)| !cache.contains_key(*k) && seen.insert((*k).clone()))
                .map(|(k, c)| (k.clone(), c.text.as_str()))
                .collect()
        };

        // The cache lock is not held across embedder calls.
        let mut fresh = Vec::with_capacity(missing.len());
        for (key, text) in missing {
            fresh.push((key, self.embedder.embed(&self.model, text)?));
        }

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let added = fresh.len();
        cache.extend(fresh);
        if added > 0 {
            tracing::debug!(added, total = cache.len(), "embedded new chunks");
            let live: HashSet<&String> = keys.iter().collect();
            cache.retain(|k, _| live.contains(k));
            if let Some(path) = self.cache_path.as_deref() {
                if let Err(e) = write_cache(path, &self.model, &cache) {
                    tracing::warn!(error = %e, "vector cache not persisted");
                }
            }
        }

        keys.iter()
            .map(|k| {
                cache.get(k).cloned().ok_or_else(|| {
                    AppError::retrieval("Chunk vector missing from cache")
                        .with_details(format!("text_sha256={k}"))
                })
            })
            .collect()
    }
}

impl SimilaritySearch for EmbeddingSearch {
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<(Chunk, f32)>, AppError> {
        let index = self.store.snapshot();
        let q = query.trim();
        if index.is_empty() || q.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let qv = self.embedder.embed(&self.model, q)?;
        let qnorm = similarity::l2_norm(&qv);
        if qnorm == 0.0 {
            return Err(AppError::retrieval("Query embedding norm is zero"));
        }

        let vectors = self.chunk_vectors(index.chunks())?;
        let mut hits: Vec<(usize, f32)> = Vec::with_capacity(vectors.len());
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != qv.len() {
                return Err(AppError::retrieval("Chunk vector dims do not match query dims")
                    .with_details(format!(
                        "query_dims={}; chunk_dims={}; model={}",
                        qv.len(),
                        v.len(),
                        self.model
                    )));
            }
            if let Some(score) = similarity::cosine_to_query(&qv, qnorm, v) {
                hits.push((i, score));
            }
        }

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);

        Ok(hits
            .into_iter()
            .map(|(i, score)| (index.chunks()[i].clone(), score))
            .collect())
    }
}

fn read_cache(path: &Path, model: &str) -> BTreeMap<String, Vec<f32>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(_) => return BTreeMap::new(),
    };
    match serde_json::from_slice::<VectorCacheFile>(&bytes) {
        Ok(file) if file.model == model => file.vectors,
        Ok(file) => {
            tracing::info!(cached_model = %file.model, model, "vector cache built for another model; ignoring");
            BTreeMap::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "vector cache unreadable; ignoring");
            BTreeMap::new()
        }
    }
}

fn write_cache(path: &Path, model: &str, vectors: &BTreeMap<String, Vec<f32>>) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::index_write("Failed to create vector cache directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }
    let file = VectorCacheFile {
        model: model.to_string(),
        vectors: vectors.clone(),
    };
    let json = serde_json::to_vec(&file).map_err(|e| {
        AppError::index_write("Failed to encode vector cache").with_details(e.to_string())
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json).map_err(|e| {
        AppError::index_write("Failed to write vector cache")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::index_write("Failed to finalize vector cache write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}
