//! On-disk layout of the index.
//!
//! Two plain-text artifacts live in the index directory so they can be
//! inspected and repaired by hand:
//! - `chunks.txt`: chunk texts in index order, each followed by a line holding
//!   only [`CHUNK_SEPARATOR`].
//! - `metadata.json`: a JSON array aligned with the chunk file, one
//!   `{"source", "sequence", "text_sha256"}` object per chunk. Only `source`
//!   is required.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use docqa_core::domain::{Chunk, UNKNOWN_SOURCE};
use docqa_core::error::AppError;
use sha2::{Digest, Sha256};

use super::model::{ChunkMeta, Index};

pub const CHUNK_SEPARATOR: &str = "###CHUNK_SEPARATOR###";
pub const CHUNKS_FILE: &str = "chunks.txt";
pub const METADATA_FILE: &str = "metadata.json";

pub fn chunks_path(dir: &Path) -> PathBuf {
    dir.join(CHUNKS_FILE)
}

pub fn metadata_path(dir: &Path) -> PathBuf {
    dir.join(METADATA_FILE)
}

pub fn text_sha256(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Write both artifacts through tmp files, renaming only once both tmp files
/// are complete. A failed write leaves the previous pair on disk.
///
/// The two renames are not atomic together. A crash between them leaves a
/// new chunk file next to old metadata; the fingerprint check then rejects
/// the pair and the index loads empty.
pub fn write_index(dir: &Path, index: &Index) -> Result<(), AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::index_write("Failed to create index directory")
            .with_details(format!("path={}; err={}", dir.display(), e))
    })?;

    let mut body = String::new();
    for chunk in index.chunks() {
        body.push_str(&chunk.text);
        body.push('\n');
        body.push_str(CHUNK_SEPARATOR);
        body.push('\n');
    }

    let meta: Vec<ChunkMeta> = index
        .chunks()
        .iter()
        .map(|c| ChunkMeta {
            source: c.source.clone(),
            sequence: Some(c.sequence),
            text_sha256: Some(text_sha256(&c.text)),
        })
        .collect();
    let json = serde_json::to_string_pretty(&meta).map_err(|e| {
        AppError::index_write("Failed to encode index metadata").with_details(e.to_string())
    })?;

    let cpath = chunks_path(dir);
    let mpath = metadata_path(dir);
    let ctmp = write_tmp(&cpath, body.as_bytes())?;
    let mtmp = match write_tmp(&mpath, json.as_bytes()) {
        Ok(tmp) => tmp,
        Err(e) => {
            let _ = fs::remove_file(&ctmp);
            return Err(e);
        }
    };
    rename_into_place(&ctmp, &cpath)?;
    rename_into_place(&mtmp, &mpath)
}

fn write_tmp(path: &Path, bytes: &[u8]) -> Result<PathBuf, AppError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| {
        AppError::index_write("Failed to write index artifact")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    Ok(tmp)
}

fn rename_into_place(tmp: &Path, path: &Path) -> Result<(), AppError> {
    fs::rename(tmp, path).map_err(|e| {
        AppError::index_write("Failed to finalize index artifact write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}

/// Read the persisted index.
///
/// A missing chunk file is a fresh index and yields an empty one. Anything
/// unreadable, malformed or inconsistent is reported as `RAG_INDEX_CORRUPT`;
/// [`super::IndexStore`] turns that into an empty index.
pub fn read_index(dir: &Path) -> Result<Index, AppError> {
    let cpath = chunks_path(dir);
    if !cpath.exists() {
        return Ok(Index::default());
    }
    let raw = fs::read_to_string(&cpath).map_err(|e| {
        AppError::index_corrupt("Failed to read chunk file")
            .with_details(format!("path={}; err={}", cpath.display(), e))
    })?;
    let texts: Vec<&str> = raw
        .split(CHUNK_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let mpath = metadata_path(dir);
    if !mpath.exists() {
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(*t, UNKNOWN_SOURCE, i.min(u32::MAX as usize) as u32))
            .collect();
        return Ok(Index::new(chunks));
    }

    let meta_raw = fs::read(&mpath).map_err(|e| {
        AppError::index_corrupt("Failed to read index metadata")
            .with_details(format!("path={}; err={}", mpath.display(), e))
    })?;
    let meta: Vec<ChunkMeta> = serde_json::from_slice(&meta_raw).map_err(|e| {
        AppError::index_corrupt("Failed to decode index metadata")
            .with_details(format!("path={}; err={}", mpath.display(), e))
    })?;
    if meta.len() != texts.len() {
        return Err(AppError::index_corrupt(
            "Index metadata is not aligned with the chunk file",
        )
        .with_details(format!("chunks={}; metadata={}", texts.len(), meta.len())));
    }

    let mut next_sequence: BTreeMap<String, u32> = BTreeMap::new();
    let mut chunks = Vec::with_capacity(texts.len());
    for (pos, (text, m)) in texts.into_iter().zip(meta).enumerate() {
        if let Some(expected) = m.text_sha256.as_deref() {
            if expected != text_sha256(text) {
                return Err(AppError::index_corrupt("Chunk text does not match its fingerprint")
                    .with_details(format!("position={pos}; source={}", m.source)));
            }
        }
        let counter = next_sequence.entry(m.source.clone()).or_insert(0);
        let sequence = m.sequence.unwrap_or(*counter);
        *counter = sequence.saturating_add(1);
        chunks.push(Chunk::new(text, m.source, sequence));
    }
    Ok(Index::new(chunks))
}
