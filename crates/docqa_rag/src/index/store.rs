use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use docqa_core::domain::Chunk;
use docqa_core::error::AppError;

use super::model::Index;
use super::persist::{self, CHUNK_SEPARATOR};

/// In-memory index kept resident for queries, persisted after every mutation.
///
/// Readers take an `Arc` snapshot and never block on a rebuild. Mutations are
/// serialized by a writer lock; each one builds a new snapshot, swaps it in,
/// then persists it. A persistence failure is reported but the swapped-in
/// snapshot stays visible.
#[derive(Debug)]
pub struct IndexStore {
    dir: PathBuf,
    current: RwLock<Arc<Index>>,
    writer: Mutex<()>,
}

impl IndexStore {
    /// Open the index stored in `dir`, loading whatever is on disk.
    pub fn open(dir: PathBuf) -> Self {
        let index = load_or_empty(&dir);
        Self {
            dir,
            current: RwLock::new(Arc::new(index)),
            writer: Mutex::new(()),
        }
    }

    /// An empty store that persists into `dir` but ignores what is there.
    pub fn empty(dir: PathBuf) -> Self {
        Self {
            dir,
            current: RwLock::new(Arc::new(Index::default())),
            writer: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    pub fn snapshot(&self) -> Arc<Index> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Append chunks in order, then persist the whole index.
    ///
    /// Chunks are trimmed; empty chunks or chunks containing the separator
    /// token are rejected before anything changes.
    pub fn add(&self, chunks: Vec<Chunk>) -> Result<usize, AppError> {
        let chunks = normalize_chunks(chunks)?;
        let added = chunks.len();
        let _w = self.lock_writer();
        let next = self.snapshot().appended(chunks);
        self.swap_and_save(next)?;
        Ok(added)
    }

    /// Drop every chunk and persist the empty index.
    pub fn clear(&self) -> Result<(), AppError> {
        let _w = self.lock_writer();
        self.swap_and_save(Index::default())
    }

    /// Replace the whole index with `chunks` in one swap (clear + add).
    pub fn rebuild(&self, chunks: Vec<Chunk>) -> Result<usize, AppError> {
        let chunks = normalize_chunks(chunks)?;
        let total = chunks.len();
        let _w = self.lock_writer();
        self.swap_and_save(Index::new(chunks))?;
        Ok(total)
    }

    /// Remove the chunks of `source` and append `chunks` in their place at the
    /// end of the index, in one swap.
    pub fn replace_source(&self, source: &str, chunks: Vec<Chunk>) -> Result<usize, AppError> {
        let chunks = normalize_chunks(chunks)?;
        let added = chunks.len();
        let _w = self.lock_writer();
        let next = self.snapshot().without_source(source).appended(chunks);
        self.swap_and_save(next)?;
        Ok(added)
    }

    /// Persist the current snapshot.
    pub fn save(&self) -> Result<(), AppError> {
        let _w = self.lock_writer();
        persist::write_index(&self.dir, &self.snapshot())
    }

    /// Reload from disk, replacing the in-memory index. Returns the chunk count.
    pub fn load(&self) -> usize {
        let _w = self.lock_writer();
        let index = load_or_empty(&self.dir);
        let n = index.len();
        self.swap(index);
        n
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn swap(&self, next: Index) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(next);
    }

    fn swap_and_save(&self, next: Index) -> Result<(), AppError> {
        let snapshot = Arc::new(next);
        {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            *guard = Arc::clone(&snapshot);
        }
        match persist::write_index(&self.dir, &snapshot) {
            Ok(()) => {
                tracing::info!(dir = %self.dir.display(), chunks = snapshot.len(), "index saved");
                Ok(())
            }
            Err(e) => {
                tracing::error!(dir = %self.dir.display(), error = %e, "index persistence failed");
                Err(e)
            }
        }
    }
}

fn load_or_empty(dir: &Path) -> Index {
    match persist::read_index(dir) {
        Ok(index) => {
            tracing::info!(dir = %dir.display(), chunks = index.len(), "index loaded");
            index
        }
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "index unreadable; starting empty");
            Index::default()
        }
    }
}

fn normalize_chunks(chunks: Vec<Chunk>) -> Result<Vec<Chunk>, AppError> {
    chunks
        .into_iter()
        .map(|c| {
            let text = c.text.trim();
            if text.is_empty() {
                return Err(AppError::ingestion("Chunk text is empty")
                    .with_details(format!("source={}; sequence={}", c.source, c.sequence)));
            }
            if text.contains(CHUNK_SEPARATOR) {
                return Err(AppError::ingestion("Chunk text contains the reserved separator")
                    .with_details(format!("source={}; sequence={}", c.source, c.sequence)));
            }
            Ok(Chunk::new(text, c.source, c.sequence))
        })
        .collect()
}
