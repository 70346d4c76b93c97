use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docqa_core::domain::Chunk;
use docqa_core::error::AppError;
use serde::{Deserialize, Serialize};

use crate::chunking::chunk_document;
use crate::index::{IndexStore, CHUNK_SEPARATOR};

/// Pulls plain text out of a document file.
pub trait TextExtractor: Send + Sync {
    fn supports(&self, path: &Path) -> bool;
    fn extract(&self, path: &Path) -> Result<String, AppError>;
}

/// Reads UTF-8 `.txt` and `.md` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

impl TextExtractor for PlainTextExtractor {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| PLAIN_TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn extract(&self, path: &Path) -> Result<String, AppError> {
        let bytes = fs::read(path).map_err(|e| {
            AppError::ingestion("Failed to read document")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let text = String::from_utf8(bytes).map_err(|e| {
            AppError::ingestion("Document is not valid UTF-8")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Ok(normalize_text(&text))
    }
}

/// Unify line endings and drop a leading byte-order mark.
pub fn normalize_text(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentFailure {
    pub source: String,
    pub error: AppError,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    /// True when a non-empty index was kept instead of rebuilt.
    pub reused_existing: bool,
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<DocumentFailure>,
}

/// Turns documents into chunks and hands them to the [`IndexStore`].
pub struct Ingestor {
    store: Arc<IndexStore>,
    extractor: Box<dyn TextExtractor>,
    chunk_size: usize,
    overlap: usize,
}

impl Ingestor {
    pub fn new(store: Arc<IndexStore>, chunk_size: usize, overlap: usize) -> Self {
        Self {
            store,
            extractor: Box::new(PlainTextExtractor),
            chunk_size,
            overlap,
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Chunk `text` and index it under `source`, replacing whatever that
    /// source contributed before. Returns the number of chunks indexed.
    pub fn ingest_document(&self, source: &str, text: &str) -> Result<usize, AppError> {
        let chunks = self.prepare(source, text)?;
        let n = self.store.replace_source(source, chunks)?;
        tracing::info!(source, chunks = n, total = self.store.len(), "document ingested");
        Ok(n)
    }

    /// Extract and ingest one file, labelled with its file name.
    pub fn ingest_file(&self, path: &Path) -> Result<usize, AppError> {
        let source = source_label(path)?;
        let text = self.extract(path)?;
        self.ingest_document(&source, &text)
    }

    /// Index every supported document directly inside `dir`, in file-name
    /// order, replacing the whole index in one swap.
    ///
    /// A non-empty index is kept as-is unless `force_reindex` is set. A
    /// document that fails is recorded in the report and skipped. When every
    /// document fails, the index is left untouched and the call errors.
    pub fn ingest_directory(&self, dir: &Path, force_reindex: bool) -> Result<IngestReport, AppError> {
        if !force_reindex && !self.store.is_empty() {
            let chunks = self.store.len();
            tracing::info!(chunks, "index already populated; skipping directory scan");
            return Ok(IngestReport {
                reused_existing: true,
                chunks_indexed: chunks,
                ..IngestReport::default()
            });
        }

        let files = self.list_documents(dir)?;
        let mut report = IngestReport::default();
        let mut all_chunks: Vec<Chunk> = Vec::new();

        for path in files {
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let result = source_label(&path)
                .and_then(|source| self.extract(&path).map(|text| (source, text)))
                .and_then(|(source, text)| self.prepare(&source, &text));
            match result {
                Ok(chunks) => {
                    tracing::info!(source = %label, chunks = chunks.len(), "document chunked");
                    report.documents_indexed += 1;
                    all_chunks.extend(chunks);
                }
                Err(error) => {
                    tracing::warn!(source = %label, error = %error, "document skipped");
                    report.failures.push(DocumentFailure {
                        source: label,
                        error,
                    });
                }
            }
        }

        if report.documents_indexed == 0 && !report.failures.is_empty() {
            let failed: Vec<String> = report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.source, f.error))
                .collect();
            tracing::warn!(
                failures = report.failures.len(),
                kept = self.store.len(),
                "no document could be indexed; keeping existing index"
            );
            return Err(AppError::ingestion("No document could be indexed; existing index kept")
                .with_details(failed.join("; ")));
        }

        report.chunks_indexed = self.store.rebuild(all_chunks)?;
        tracing::info!(
            documents = report.documents_indexed,
            chunks = report.chunks_indexed,
            failures = report.failures.len(),
            "directory indexed"
        );
        Ok(report)
    }

    fn list_documents(&self, dir: &Path) -> Result<Vec<PathBuf>, AppError> {
        let entries = fs::read_dir(dir).map_err(|e| {
            AppError::ingestion("Failed to read documents directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && self.extractor.supports(p))
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn extract(&self, path: &Path) -> Result<String, AppError> {
        if !self.extractor.supports(path) {
            return Err(AppError::ingestion("Unsupported document type")
                .with_details(format!("path={}", path.display())));
        }
        self.extractor.extract(path)
    }

    fn prepare(&self, source: &str, text: &str) -> Result<Vec<Chunk>, AppError> {
        if source.trim().is_empty() {
            return Err(AppError::ingestion("Source label is empty"));
        }
        if text.trim().is_empty() {
            return Err(AppError::ingestion("Document text is empty")
                .with_details(format!("source={source}")));
        }
        if text.contains(CHUNK_SEPARATOR) {
            return Err(AppError::ingestion("Document contains the reserved separator token")
                .with_details(format!("source={source}")));
        }
        let chunks = chunk_document(text, source, self.chunk_size, self.overlap);
        if chunks.is_empty() {
            return Err(AppError::ingestion("Document produced no chunks")
                .with_details(format!("source={source}")));
        }
        Ok(chunks)
    }
}

fn source_label(path: &Path) -> Result<String, AppError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            AppError::ingestion("Document path has no file name")
                .with_details(format!("path={}", path.display()))
        })
}
