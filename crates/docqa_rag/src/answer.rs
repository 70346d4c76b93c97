//! Query orchestration: retrieve, assemble context, generate, and degrade to a
//! disclaimer-bearing fallback whenever retrieval or generation comes up empty.
//!
//! [`QueryEngine::answer`] never returns an error. Every failure below it is
//! logged and turned into the fallback path.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use docqa_core::config::{PromptConfig, RagConfig};
use docqa_core::domain::{Message, Query};
use docqa_core::error::AppError;
use serde::{Deserialize, Serialize};

use crate::context::{assemble, render_primary, with_disclaimer, GENERATION_APOLOGY};
use crate::llm::Generator;
use crate::retrieve::RetrievalBackend;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Generated from retrieved context.
    Grounded,
    /// Generated without context, prefixed with the disclaimer.
    Fallback,
    /// Fallback generation failed too; disclaimer plus apology.
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub kind: AnswerKind,
    /// Distinct source labels of the context chunks, in rank order.
    pub sources: Vec<String>,
}

pub struct QueryEngine {
    backend: Arc<dyn RetrievalBackend>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    history_window: usize,
    prompts: PromptConfig,
    timeout: Duration,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("backend", &self.backend.name())
            .field("top_k", &self.top_k)
            .field("history_window", &self.history_window)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl QueryEngine {
    /// Engine with default settings (`top_k` 5, history window 6, 60s timeout).
    pub fn new(backend: Arc<dyn RetrievalBackend>, generator: Arc<dyn Generator>) -> Self {
        Self::from_config(backend, generator, &RagConfig::default())
    }

    pub fn from_config(
        backend: Arc<dyn RetrievalBackend>,
        generator: Arc<dyn Generator>,
        cfg: &RagConfig,
    ) -> Self {
        Self {
            backend,
            generator,
            top_k: cfg.top_k,
            history_window: cfg.history_window,
            prompts: cfg.prompts.clone(),
            timeout: Duration::from_secs(cfg.generator.timeout_secs),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptConfig) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Answer text only.
    pub fn answer(&self, query: &Query) -> String {
        self.answer_detailed(query).text
    }

    pub fn answer_detailed(&self, query: &Query) -> Answer {
        let history = trim_history(&query.history, self.history_window);

        let hits = match self.backend.retrieve(&query.text, self.top_k) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "retrieval failed; using fallback");
                Vec::new()
            }
        };

        if hits.is_empty() {
            tracing::info!(backend = self.backend.name(), "no context retrieved; using fallback");
        } else {
            let context = assemble(&hits);
            let system = render_primary(&self.prompts.primary, &context);
            let messages = build_messages(system, &history, &query.text);
            match self.generate(messages) {
                Ok(text) => {
                    let mut sources: Vec<String> = Vec::new();
                    for hit in &hits {
                        if !sources.contains(&hit.chunk.source) {
                            sources.push(hit.chunk.source.clone());
                        }
                    }
                    tracing::info!(chunks = hits.len(), sources = sources.len(), "answered from context");
                    return Answer {
                        text,
                        kind: AnswerKind::Grounded,
                        sources,
                    };
                }
                Err(e) => {
                    tracing::warn!(error = %e, "generation with context failed; using fallback");
                }
            }
        }

        self.fallback(&history, &query.text)
    }

    fn fallback(&self, history: &[Message], question: &str) -> Answer {
        let messages = build_messages(self.prompts.fallback.clone(), history, question);
        match self.generate(messages) {
            Ok(text) => Answer {
                text: with_disclaimer(&text),
                kind: AnswerKind::Fallback,
                sources: Vec::new(),
            },
            Err(e) => {
                tracing::error!(error = %e, "fallback generation failed");
                Answer {
                    text: with_disclaimer(GENERATION_APOLOGY),
                    kind: AnswerKind::Unavailable,
                    sources: Vec::new(),
                }
            }
        }
    }

    /// One generator call, bounded by the configured timeout. A call that
    /// outlives the timeout is abandoned; its thread finishes in the
    /// background and its result is dropped.
    fn generate(&self, messages: Vec<Message>) -> Result<String, AppError> {
        let (tx, rx) = mpsc::channel();
        let generator = Arc::clone(&self.generator);
        thread::Builder::new()
            .name("docqa-generate".to_string())
            .spawn(move || {
                let _ = tx.send(generator.generate(&messages));
            })
            .map_err(|e| {
                AppError::generation("Failed to start generator call").with_details(e.to_string())
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => {
                let text = result?;
                if text.trim().is_empty() {
                    return Err(AppError::generation("Generator returned an empty answer"));
                }
                Ok(text)
            }
            Err(RecvTimeoutError::Timeout) => Err(AppError::generation("Generator timed out")
                .with_details(format!("timeout_ms={}", self.timeout.as_millis()))
                .with_retryable(true)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(AppError::generation("Generator call ended without a result"))
            }
        }
    }
}

/// The most recent `window` messages, oldest first.
pub fn trim_history(history: &[Message], window: usize) -> Vec<Message> {
    let start = history.len().saturating_sub(window);
    history[start..].to_vec()
}

/// System instruction, then history, then the question as the final message.
pub fn build_messages(system: String, history: &[Message], question: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system));
    messages.extend(history.iter().cloned());
    messages.push(Message::user(question));
    messages
}
