use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use marginalia::config::Config;
use marginalia::context::extract_document_text;
use marginalia::dispatch::registry::Registry;
use marginalia::document::{Annotation, DocumentView, TextDocument};
use marginalia::language::response_instruction;
use marginalia::message::MessageHistory;
use marginalia::notebook::{LogNotifier, MemorySettings, NotebookWriter, format_log_entry};
use marginalia::notes::build_notes_context;
use marginalia::position::format_position;

const ASK_SYSTEM_PROMPT: &str = "You are a helpful reading assistant. \
Answer questions about the book using the context provided.";

#[derive(Parser)]
#[command(name = "marginalia", version, about = "Ask an LLM about the book you are reading")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Plain-text book used as the open document.
    #[arg(long, global = true)]
    book: Option<PathBuf>,

    /// Reading position as a character offset into the book.
    #[arg(long, global = true)]
    position: Option<usize>,

    /// Append the answer to the notebook.
    #[arg(long, global = true)]
    log: bool,

    /// Notebook file; defaults to the book path with a `.md` extension.
    #[arg(long, global = true)]
    notebook: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question about the book.
    Ask {
        question: String,

        /// JSON array of highlights/notes to include as context.
        #[arg(long)]
        annotations: Option<PathBuf>,

        /// Include the notebook contents as context.
        #[arg(long)]
        include_notebook: bool,

        /// Include the book text read so far as context.
        #[arg(long)]
        with_book_text: bool,
    },
    /// Summarize the book up to the reading position.
    Recap {
        /// Book title used in the prompt; defaults to the file name.
        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load();
    let registry = Registry::with_known_providers();
    let limits = config
        .as_ref()
        .map(Config::context_limits)
        .unwrap_or_default();
    let instruction = config.as_ref().and_then(response_instruction);

    let doc = match &cli.book {
        Some(path) => {
            let doc = TextDocument::open(path)
                .with_context(|| format!("cannot open book {}", path.display()))?;
            // No explicit position: treat the whole file as read.
            let position = cli.position.unwrap_or(usize::MAX);
            Some(doc.with_position(position))
        }
        None => None,
    };
    let title = cli
        .book
        .as_deref()
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Untitled".to_string());

    let (history, question) = match &cli.command {
        Command::Ask {
            question,
            annotations,
            include_notebook,
            with_book_text,
        } => {
            let system = match &instruction {
                Some(line) => format!("{ASK_SYSTEM_PROMPT}\n{line}"),
                None => ASK_SYSTEM_PROMPT.to_string(),
            };
            let mut history = MessageHistory::with_system(system);

            let annotations = match annotations {
                Some(path) => load_annotations(path).await?,
                None => Vec::new(),
            };
            let notebook_path = cli.notebook.clone().or_else(|| {
                cli.book.as_ref().map(|b| b.with_extension("md"))
            });
            let notes = build_notes_context(
                &annotations,
                *include_notebook,
                notebook_path.as_deref(),
                limits.max_text_length,
            )
            .await;
            history.push_context("Highlights and notes", &notes);

            if *with_book_text && let Some(doc) = &doc {
                history.push_context("Book text", &extract_document_text(doc, limits));
            }
            history.push_user(question.clone());
            (history, Some(question.clone()))
        }
        Command::Recap { title: custom } => {
            let doc = doc.as_ref().context("recap needs --book")?;
            let recap = config.as_ref().map(Config::recap).unwrap_or_default();
            let text = extract_document_text(doc, limits);
            let title = custom.as_deref().unwrap_or(&title);
            let history = MessageHistory::recap(&recap, title, &text, instruction.as_deref());
            (history, None)
        }
    };

    let answer = match registry.dispatch(config.as_ref(), &history).await.into_result() {
        Ok(answer) => answer,
        Err(message) => anyhow::bail!(message),
    };
    println!("{answer}");

    if cli.log {
        let position = doc
            .as_ref()
            .map(|d| format_position(d, None))
            .unwrap_or_default();
        let entry = format_log_entry(&title, &position, question.as_deref(), &answer);
        let writer = NotebookWriter::new(
            Arc::new(MemorySettings::new(cli.notebook.clone())),
            Arc::new(LogNotifier),
        );
        let config = config.unwrap_or_default();
        let doc_view = doc.as_ref().map(|d| d as &dyn DocumentView);
        if let Some(path) = writer.append_log(&entry, &config, doc_view).await {
            tracing::info!(path = %path.display(), "answer saved to notebook");
        }
    }

    Ok(())
}

async fn load_annotations(path: &std::path::Path) -> anyhow::Result<Vec<Annotation>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read annotations {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid annotations {}", path.display()))
}
