use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use docqa_core::config::PromptConfig;
use docqa_core::domain::{Chunk, Message, Query, Role};
use docqa_core::error::AppError;
use docqa_rag::answer::{trim_history, AnswerKind, QueryEngine};
use docqa_rag::context::{FALLBACK_DISCLAIMER, GENERATION_APOLOGY};
use docqa_rag::index::IndexStore;
use docqa_rag::llm::Generator;
use docqa_rag::retrieve::{KeywordBackend, RetrievalBackend, ScoredChunk};
use pretty_assertions::assert_eq;

/// Records every call and answers according to `respond`.
struct ScriptedGenerator {
    calls: Mutex<Vec<Vec<Message>>>,
    respond: Box<dyn Fn(&[Message]) -> Result<String, AppError> + Send + Sync>,
}

impl ScriptedGenerator {
    fn new(respond: impl Fn(&[Message]) -> Result<String, AppError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    fn answering(text: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(text.to_string()))
    }

    fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().expect("lock").clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, messages: &[Message]) -> Result<String, AppError> {
        self.calls.lock().expect("lock").push(messages.to_vec());
        (self.respond)(messages)
    }
}

fn is_primary(messages: &[Message]) -> bool {
    messages[0].content.contains("[Source 1:")
}

struct BrokenBackend;

impl RetrievalBackend for BrokenBackend {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        Err(AppError::retrieval("backend offline"))
    }
}

fn keyword_backend(tmp: &tempfile::TempDir, chunks: Vec<Chunk>) -> Arc<dyn RetrievalBackend> {
    let store = Arc::new(IndexStore::open(tmp.path().join("index")));
    if !chunks.is_empty() {
        store.add(chunks).expect("add");
    }
    Arc::new(KeywordBackend::new(store))
}

fn pump_chunks() -> Vec<Chunk> {
    vec![
        Chunk::new("Maximum pressure is 10 bar.", "pump.md", 0),
        Chunk::new("The housing is cast iron.", "pump.md", 1),
        Chunk::new("Relief pressure is 12 bar.", "valve.md", 0),
    ]
}

#[test]
fn empty_index_answers_with_disclaimer() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let generator = ScriptedGenerator::answering("I can only offer general guidance.");
    let engine = QueryEngine::new(keyword_backend(&tmp, Vec::new()), generator.clone());

    let answer = engine.answer_detailed(&Query::new("What is the maximum pressure?"));
    assert_eq!(answer.kind, AnswerKind::Fallback);
    assert!(answer.text.starts_with(FALLBACK_DISCLAIMER));
    assert!(answer.text.ends_with("I can only offer general guidance."));

    let calls = generator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], Message::system(PromptConfig::default().fallback));
    assert_eq!(calls[0][1], Message::user("What is the maximum pressure?"));
}

#[test]
fn grounded_answer_carries_context_history_and_question() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let generator = ScriptedGenerator::answering("10 bar.");
    let engine = QueryEngine::new(keyword_backend(&tmp, pump_chunks()), generator.clone());

    let history = vec![
        Message::user("Hi"),
        Message::assistant("Hello, how can I help?"),
    ];
    let query = Query::new("What is the maximum pressure?").with_history(history.clone());
    let answer = engine.answer_detailed(&query);

    assert_eq!(answer.kind, AnswerKind::Grounded);
    assert_eq!(answer.text, "10 bar.");
    assert_eq!(answer.sources, vec!["pump.md".to_string(), "valve.md".to_string()]);

    let calls = generator.calls();
    assert_eq!(calls.len(), 1);
    let messages = &calls[0];
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0]
        .content
        .contains("[Source 1: pump.md]\nMaximum pressure is 10 bar.\n\n[Source 2: valve.md]\nRelief pressure is 12 bar.\n"));
    assert!(!messages[0].content.contains("{context}"));
    assert_eq!(&messages[1..3], history.as_slice());
    assert_eq!(messages[3], Message::user("What is the maximum pressure?"));
}

#[test]
fn history_is_trimmed_to_window() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let generator = ScriptedGenerator::answering("ok");
    let engine = QueryEngine::new(keyword_backend(&tmp, pump_chunks()), generator.clone())
        .with_history_window(6);

    let history: Vec<Message> = (0..10)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("q{i}"))
            } else {
                Message::assistant(format!("a{i}"))
            }
        })
        .collect();
    engine.answer(&Query::new("maximum pressure").with_history(history.clone()));

    let messages = &generator.calls()[0];
    assert_eq!(messages.len(), 8);
    assert_eq!(&messages[1..7], &history[4..]);
}

#[test]
fn trim_history_edges() {
    let history = vec![Message::user("a"), Message::assistant("b"), Message::user("c")];
    assert!(trim_history(&history, 0).is_empty());
    assert_eq!(trim_history(&history, 10), history);
    assert_eq!(trim_history(&history, 2), history[1..].to_vec());
}

#[test]
fn generator_failure_with_context_falls_back() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let generator = ScriptedGenerator::new(|messages| {
        if is_primary(messages) {
            Err(AppError::generation("model crashed"))
        } else {
            Ok("general answer".to_string())
        }
    });
    let engine = QueryEngine::new(keyword_backend(&tmp, pump_chunks()), generator.clone());

    let answer = engine.answer_detailed(&Query::new("maximum pressure"));
    assert_eq!(answer.kind, AnswerKind::Fallback);
    assert!(answer.text.starts_with(FALLBACK_DISCLAIMER));
    assert!(answer.sources.is_empty());
    assert_eq!(generator.calls().len(), 2);
}

#[test]
fn blank_generation_counts_as_failure() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let generator = ScriptedGenerator::new(|messages| {
        if is_primary(messages) {
            Ok("   ".to_string())
        } else {
            Ok("general answer".to_string())
        }
    });
    let engine = QueryEngine::new(keyword_backend(&tmp, pump_chunks()), generator);

    assert_eq!(
        engine.answer_detailed(&Query::new("maximum pressure")).kind,
        AnswerKind::Fallback
    );
}

#[test]
fn total_generator_outage_still_answers() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let generator = ScriptedGenerator::new(|_| Err(AppError::generation("offline")));
    let engine = QueryEngine::new(keyword_backend(&tmp, pump_chunks()), generator);

    let answer = engine.answer_detailed(&Query::new("maximum pressure"));
    assert_eq!(answer.kind, AnswerKind::Unavailable);
    assert!(answer.text.starts_with(FALLBACK_DISCLAIMER));
    assert!(answer.text.ends_with(GENERATION_APOLOGY));
}

#[test]
fn slow_generator_times_out_into_fallback() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let generator = ScriptedGenerator::new(|messages| {
        if is_primary(messages) {
            thread::sleep(Duration::from_secs(2));
            Ok("too late".to_string())
        } else {
            Ok("quick general answer".to_string())
        }
    });
    let engine = QueryEngine::new(keyword_backend(&tmp, pump_chunks()), generator)
        .with_timeout(Duration::from_millis(100));

    let answer = engine.answer_detailed(&Query::new("maximum pressure"));
    assert_eq!(answer.kind, AnswerKind::Fallback);
    assert!(answer.text.ends_with("quick general answer"));
}

#[test]
fn retrieval_error_falls_back() {
    let generator = ScriptedGenerator::answering("general answer");
    let engine = QueryEngine::new(Arc::new(BrokenBackend), generator.clone());

    let answer = engine.answer_detailed(&Query::new("maximum pressure"));
    assert_eq!(answer.kind, AnswerKind::Fallback);
    assert!(answer.text.starts_with(FALLBACK_DISCLAIMER));
    assert_eq!(generator.calls().len(), 1);
}

#[test]
fn custom_prompts_are_used() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let generator = ScriptedGenerator::answering("ok");
    let engine = QueryEngine::new(keyword_backend(&tmp, pump_chunks()), generator.clone())
        .with_top_k(1)
        .with_prompts(PromptConfig {
            primary: "CTX<{context}>".to_string(),
            fallback: "NO CONTEXT".to_string(),
        });

    engine.answer(&Query::new("maximum pressure"));
    assert_eq!(
        generator.calls()[0][0].content,
        "CTX<[Source 1: pump.md]\nMaximum pressure is 10 bar.\n>"
    );
}
