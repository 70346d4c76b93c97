//! Sparse keyword scoring over the resident index.
//!
//! Every query scans all chunks; there is no inverted index.

use std::collections::HashSet;
use std::sync::Arc;

use docqa_core::domain::Chunk;
use docqa_core::error::AppError;

use super::{RetrievalBackend, ScoredChunk};
use crate::index::IndexStore;

/// Added when the whole query appears verbatim inside a chunk.
pub const EXACT_PHRASE_BONUS: u32 = 10;

/// Query tokens of this many characters or fewer carry no signal.
const MIN_TOKEN_CHARS: usize = 3;

const STOP_WORDS: &[&str] = &[
    // English
    "the", "and", "for", "are", "was", "were", "been", "being", "what", "which", "who", "whom",
    "whose", "when", "where", "why", "how", "this", "that", "these", "those", "with", "from",
    "into", "about", "does", "did", "has", "have", "had", "can", "could", "would", "should",
    "will", "shall", "may", "might", "must", "not", "but", "its", "our", "your", "their",
    "there", "here", "than", "then", "also", "any", "all", "some", "such", "very", "you",
    "they", "them", "she", "her", "his", "him", "tell", "please",
    // Russian
    "что", "как", "где", "когда", "кто", "какой", "какая", "какие", "какое", "каких", "это",
    "для", "или", "при", "про", "над", "под", "без", "чем", "так", "все", "всё", "она", "они",
    "его", "еще", "ещё", "уже", "этот", "эта", "эти", "есть", "был", "была", "были", "быть",
    "можно", "нужно", "надо", "мне", "вам", "нам", "расскажи", "скажи", "пожалуйста",
];

/// Lowercase word tokens: maximal runs of alphanumerics and `_`.
pub fn word_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Distinct query tokens that survive the length and stop-word filters.
pub fn query_terms(query: &str) -> HashSet<String> {
    word_tokens(query)
        .into_iter()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS && !is_stop_word(t))
        .collect()
}

/// Score one chunk: distinct shared tokens, plus the exact-phrase bonus.
pub fn score_chunk(terms: &HashSet<String>, phrase: &str, chunk_text: &str) -> u32 {
    let chunk_tokens: HashSet<String> = word_tokens(chunk_text).into_iter().collect();
    let overlap = terms.iter().filter(|t| chunk_tokens.contains(*t)).count();
    let mut score = overlap.min(u32::MAX as usize) as u32;
    if !phrase.is_empty() && chunk_text.to_lowercase().contains(phrase) {
        score += EXACT_PHRASE_BONUS;
    }
    score
}

/// Rank `chunks` against `query`, best first. Equal scores keep index order.
pub fn rank(query: &str, chunks: &[Chunk], top_k: usize) -> Vec<ScoredChunk> {
    let terms = query_terms(query);
    if terms.is_empty() {
        tracing::debug!(query, "no meaningful keywords in query");
        return Vec::new();
    }
    let phrase = query.trim().to_lowercase();

    let mut scored: Vec<(u32, &Chunk)> = chunks
        .iter()
        .map(|c| (score_chunk(&terms, &phrase, &c.text), c))
        .filter(|(score, _)| *score > 0)
        .collect();
    // Stable: ties keep index order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(score, chunk)| ScoredChunk {
            chunk: chunk.clone(),
            score: score as f32,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct KeywordBackend {
    store: Arc<IndexStore>,
}

impl KeywordBackend {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    /// Chunk texts only, best first.
    pub fn retrieve_texts(&self, query: &str, top_k: usize) -> Vec<String> {
        rank(query, self.store.snapshot().chunks(), top_k)
            .into_iter()
            .map(|s| s.chunk.text)
            .collect()
    }
}

impl RetrievalBackend for KeywordBackend {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        let index = self.store.snapshot();
        let hits = rank(query, index.chunks(), top_k);
        tracing::info!(
            found = hits.len(),
            total = index.len(),
            "keyword retrieval finished"
        );
        Ok(hits)
    }
}
