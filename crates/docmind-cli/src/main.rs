//! DocuMind CLI - Ask questions about a document
//!
//! Usage:
//!   docmind ask <file> <question>...
//!   docmind chat <file>

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use docmind_core::{AppConfig, LoggingConfig};
use docmind_rag::{IngestionOutcome, RagOrchestrator, SessionState, Upload};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docmind")]
#[command(about = "Document question answering with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a document and answer one question
    Ask {
        /// Document to ingest (.pdf, .txt, .md)
        file: PathBuf,
        /// Question to ask
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Ingest a document and answer questions from stdin until EOF or `exit`
    Chat {
        /// Document to ingest (.pdf, .txt, .md)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    init_tracing(&config.logging);
    tracing::debug!(config_file = ?cli.config, provider = ?config.llm.provider, "configuration loaded");

    let pipeline = RagOrchestrator::from_config(&config)?;
    let progress = spawn_progress_printer(&pipeline);
    let mut state = SessionState::new();

    let result = match cli.command {
        Commands::Ask { file, question } => {
            ask(&pipeline, &mut state, &file, &question.join(" ")).await
        }
        Commands::Chat { file } => chat(&pipeline, &mut state, &file).await,
    };

    // Closing the channel lets the printer finish
    drop(pipeline);
    progress.await?;
    result
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn spawn_progress_printer(pipeline: &RagOrchestrator) -> JoinHandle<()> {
    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => eprintln!("[{:>3}%] {}", event.percent, event.status),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn ingest(
    pipeline: &RagOrchestrator,
    state: &mut SessionState,
    file: &Path,
) -> anyhow::Result<()> {
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Not a file: {}", file.display()))?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    match pipeline.ingest(state, Upload::new(file_name, bytes)).await {
        IngestionOutcome::Indexed { .. } => Ok(()),
        IngestionOutcome::Failed { message, .. } => bail!(message),
    }
}

async fn ask(
    pipeline: &RagOrchestrator,
    state: &mut SessionState,
    file: &Path,
    question: &str,
) -> anyhow::Result<()> {
    ingest(pipeline, state, file).await?;
    answer(pipeline, state, question).await;
    Ok(())
}

async fn chat(
    pipeline: &RagOrchestrator,
    state: &mut SessionState,
    file: &Path,
) -> anyhow::Result<()> {
    ingest(pipeline, state, file).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        answer(pipeline, state, question).await;
    }

    Ok(())
}

async fn answer(pipeline: &RagOrchestrator, state: &mut SessionState, question: &str) {
    let answer = pipeline.ask(state, question).await;
    if let Some(error) = &state.last_error {
        if *error != answer.text {
            eprintln!("warning: {error}");
        }
    }
    println!("{}", answer.text);
}
