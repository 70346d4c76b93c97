use std::collections::BTreeSet;

use docqa_core::domain::Chunk;
use serde::{Deserialize, Serialize};

/// Immutable, insertion-ordered collection of chunks.
///
/// Each chunk carries its own source label, so the chunk sequence and the
/// metadata sequence written to disk cannot drift apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    chunks: Vec<Chunk>,
}

impl Index {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn sources(&self) -> BTreeSet<&str> {
        self.chunks.iter().map(|c| c.source.as_str()).collect()
    }

    pub(crate) fn appended(&self, more: Vec<Chunk>) -> Index {
        let mut chunks = Vec::with_capacity(self.chunks.len() + more.len());
        chunks.extend(self.chunks.iter().cloned());
        chunks.extend(more);
        Index { chunks }
    }

    pub(crate) fn without_source(&self, source: &str) -> Index {
        Index {
            chunks: self
                .chunks
                .iter()
                .filter(|c| c.source != source)
                .cloned()
                .collect(),
        }
    }
}

/// One entry of the metadata sidecar, aligned with the chunk at the same
/// position in the chunk file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMeta {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub total_sources: usize,
    pub persist_dir: String,
    pub backend: String,
}
