//! `docqa`: index a folder of documents and ask questions about it.
//!
//! Usage:
//!   docqa index [--force]              # Index the documents directory
//!   docqa add manual.md                # Add or replace one document
//!   docqa ask "What is the max pressure?"
//!   docqa chat                         # Interactive session with history
//!   docqa stats | clear

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa_core::config::{RagConfig, DEFAULT_CONFIG_FILE};
use docqa_core::domain::{Message, Query};
use docqa_rag::ingest::{PlainTextExtractor, TextExtractor};
use docqa_rag::ollama::OllamaClient;
use docqa_rag::{AnswerKind, KnowledgeBase};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docqa", version, about = "Question answering over a local document knowledge base")]
struct Cli {
    /// Configuration file (DOCQA_* environment variables override it)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index every .txt/.md file in the documents directory
    Index {
        /// Rebuild even if an index already exists
        #[arg(long)]
        force: bool,
    },
    /// Add one document, replacing earlier chunks from the same source
    Add {
        file: PathBuf,
        /// Source label (defaults to the file name)
        #[arg(long)]
        source: Option<String>,
    },
    /// Answer a single question
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        /// Print the answer as JSON, with its sources
        #[arg(long)]
        json: bool,
    },
    /// Interactive question answering that keeps conversation history
    Chat,
    /// Show index statistics
    Stats,
    /// Remove every indexed chunk
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut config = RagConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let kb = KnowledgeBase::open(config)?;

    match cli.command {
        Command::Index { force } => {
            let report = kb.ingest_directory(force)?;
            if report.reused_existing {
                println!("Index already holds {} chunks (use --force to rebuild)", report.chunks_indexed);
            } else {
                println!(
                    "Indexed {} documents into {} chunks",
                    report.documents_indexed, report.chunks_indexed
                );
            }
            for failure in &report.failures {
                eprintln!("  skipped {}: {}", failure.source, failure.error);
            }
        }
        Command::Add { file, source } => {
            let n = match source {
                Some(label) => {
                    let text = PlainTextExtractor.extract(&file)?;
                    kb.ingest_document(&label, &text)?
                }
                None => kb.ingest_file(&file)?,
            };
            println!("Added {n} chunks from {}", file.display());
        }
        Command::Ask { question, json } => {
            warn_if_generator_unreachable(&kb);
            let engine = kb.ollama_query_engine()?;
            let answer = engine.answer_detailed(&Query::new(question.join(" ")));
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.text);
                print_sources(&answer.sources);
            }
        }
        Command::Chat => chat(&kb)?,
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&kb.stats())?);
        }
        Command::Clear => {
            kb.clear()?;
            println!("Index cleared");
        }
    }
    Ok(())
}

fn chat(kb: &KnowledgeBase) -> Result<()> {
    warn_if_generator_unreachable(kb);
    let engine = kb.ollama_query_engine()?;
    let mut history: Vec<Message> = Vec::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("Ask a question (\"exit\" to quit, \"reset\" to forget the conversation).");
    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        match question {
            "" => continue,
            "exit" | "quit" => break,
            "reset" => {
                history.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let answer = engine.answer_detailed(&Query::new(question).with_history(history.clone()));
        println!("{}", answer.text);
        if answer.kind == AnswerKind::Grounded {
            print_sources(&answer.sources);
        }
        history.push(Message::user(question));
        history.push(Message::assistant(answer.text));
    }
    Ok(())
}

/// Warn only: answers degrade to the fallback path when Ollama is down.
fn warn_if_generator_unreachable(kb: &KnowledgeBase) {
    let base_url = &kb.config().generator.base_url;
    let checked = OllamaClient::new(base_url).and_then(|client| client.health_check());
    if let Err(e) = checked {
        tracing::warn!(base_url = %base_url, error = %e, "generator unreachable; answers will fall back");
    }
}

fn print_sources(sources: &[String]) {
    if !sources.is_empty() {
        println!("\nSources: {}", sources.join(", "));
    }
}
