//! # saga
//!
//! Operator CLI: replay a raw response through the classifier, inspect the
//! budgeted context of a stored session, and manage stored sessions.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use saga_core::logging::init_subscriber;
use saga_core::{Session, SessionId, SessionMode};
use saga_runtime::{EngineConfig, GenerationError, SessionEngine};
use saga_settings::{SagaSettings, load_settings};
use saga_store::{SessionStore, SqliteStore};
use saga_stream::parse_response;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Saga session engine tools.
#[derive(Parser, Debug)]
#[command(name = "saga", about = "Saga session engine tools")]
struct Cli {
    /// Path to the `SQLite` session database (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Log filter directive (overrides settings, e.g. `debug`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a raw response file through the classifier and parser.
    Classify {
        /// File holding one raw model response.
        file: PathBuf,
        /// Fragment size in bytes.
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,
        /// Adventure mode used for parsing.
        #[arg(long, value_enum, default_value_t = ModeArg::Standard)]
        mode: ModeArg,
    },
    /// Print the budgeted context for a stored session.
    Context {
        /// Session ID.
        session_id: String,
        /// Token budget (defaults to `context.defaultBudgetTokens`).
        #[arg(long)]
        budget: Option<usize>,
        /// Action the next prompt responds to.
        #[arg(long, default_value = "")]
        action: String,
    },
    /// Manage stored sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    /// List sessions, most recently updated first.
    List {
        /// Maximum number of sessions.
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Print a stored session as JSON.
    Show {
        /// Session ID.
        session_id: String,
    },
    /// Delete a stored session.
    Delete {
        /// Session ID.
        session_id: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Standard,
    Custom,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Standard => Self::Standard,
            ModeArg::Custom => Self::Custom,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings().context("Failed to load settings")?;
    if let Some(ref path) = cli.db_path {
        settings.storage.db_path = path.display().to_string();
    }
    if let Some(ref level) = cli.log_level {
        settings.logging.level.clone_from(level);
    }
    init_subscriber(&settings.logging.level, settings.logging.format);
    debug!(db_path = %settings.storage.db_path, "settings loaded");

    match cli.command {
        Command::Classify {
            file,
            chunk_size,
            mode,
        } => classify(&settings, &file, chunk_size, mode.into()).await,
        Command::Context {
            session_id,
            budget,
            action,
        } => {
            let budget = budget.unwrap_or_else(|| {
                usize::try_from(settings.context.default_budget_tokens).unwrap_or(usize::MAX)
            });
            context(&settings, &session_id, budget, &action).await
        }
        Command::Sessions { command } => sessions(&settings, command).await,
    }
}

async fn classify(
    settings: &SagaSettings,
    file: &Path,
    chunk_size: usize,
    mode: SessionMode,
) -> Result<()> {
    if chunk_size == 0 {
        bail!("--chunk-size must be at least 1");
    }
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let config = EngineConfig::from_settings(settings)?;

    let fragments = split_chunks(&raw, chunk_size);
    debug!(fragments = fragments.len(), "replaying response");
    let stream = futures::stream::iter(fragments.into_iter().map(Ok::<_, GenerationError>));
    let collected = saga_runtime::collect_response(
        stream,
        &config.delimiters,
        &CancellationToken::new(),
        None,
    )
    .await?;

    let reasoning = collected.reasoning_trace();
    let segment = parse_response(&collected.narrative, mode)?.into_segment(reasoning);
    let report = json!({
        "segment": segment,
        "blockState": format!("{:?}", collected.block_state),
        "recovered": collected.recovered,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn context(
    settings: &SagaSettings,
    session_id: &str,
    budget: usize,
    action: &str,
) -> Result<()> {
    let store = open_store(settings)?;
    let session = load_session(&store, session_id).await?;

    let engine = SessionEngine::new(Arc::new(store), EngineConfig::from_settings(settings)?);
    let result = engine.build_context(&session, action, budget);
    eprintln!(
        "budget {budget}, estimated {} tokens, {} segments, {} actions",
        result.estimated_tokens, result.segments_included, result.actions_included
    );
    print!("{}", result.render());
    Ok(())
}

async fn sessions(settings: &SagaSettings, command: SessionsCommand) -> Result<()> {
    let store = open_store(settings)?;
    match command {
        SessionsCommand::List { limit } => {
            let summaries = store.list_sessions(limit).await?;
            if summaries.is_empty() {
                println!("No sessions.");
            }
            for s in summaries {
                println!(
                    "{}  {:<8}  {:>4} turns  updated {}",
                    s.id,
                    s.mode.as_str(),
                    s.turn_count,
                    s.updated_at
                );
            }
        }
        SessionsCommand::Show { session_id } => {
            let session = load_session(&store, &session_id).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        SessionsCommand::Delete { session_id } => {
            let id = SessionId::from(session_id.as_str());
            if store.get(&id).await?.is_none() {
                bail!("Session not found: {session_id}");
            }
            store.delete(&id).await?;
            println!("Deleted {session_id}");
        }
    }
    Ok(())
}

fn open_store(settings: &SagaSettings) -> Result<SqliteStore> {
    let path = Path::new(&settings.storage.db_path);
    SqliteStore::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

async fn load_session(store: &SqliteStore, session_id: &str) -> Result<Session> {
    store
        .get(&SessionId::from(session_id))
        .await?
        .with_context(|| format!("Session not found: {session_id}"))
}

/// Split `text` into fragments of at most `size` bytes on char boundaries.
///
/// A char wider than `size` becomes its own fragment.
fn split_chunks(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        chunks.push(text[start..end].to_owned());
        start = end;
    }
    chunks
}
