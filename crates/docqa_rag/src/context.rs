use docqa_core::config::CONTEXT_PLACEHOLDER;

use crate::retrieve::ScoredChunk;

/// Marker that opens every answer produced without retrieved context.
pub const FALLBACK_DISCLAIMER: &str =
    "⚠️ No relevant information was found in the knowledge base. The answer below is not based on the indexed documents.";

/// Appended to the disclaimer when the generator could not answer at all.
pub const GENERATION_APOLOGY: &str =
    "Sorry, an answer could not be generated right now. Please try again later.";

/// Render ranked chunks as numbered, source-labelled blocks separated by a
/// blank line. Numbering starts at 1 and follows rank order.
pub fn assemble(ranked: &[ScoredChunk]) -> String {
    ranked
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[Source {}: {}]\n{}\n", i + 1, hit.chunk.source, hit.chunk.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Substitute `context` for the single `{context}` placeholder in `template`.
pub fn render_primary(template: &str, context: &str) -> String {
    template.replacen(CONTEXT_PLACEHOLDER, context, 1)
}

/// Prefix a fallback answer with the disclaimer.
pub fn with_disclaimer(answer: &str) -> String {
    format!("{FALLBACK_DISCLAIMER}\n\n{}", answer.trim())
}
