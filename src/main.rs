//! # Session Harness CLI (`sessions`)
//!
//! Stores AI conversation transcripts as Markdown and reads them back.
//!
//! ## Usage
//!
//! ```bash
//! sessions [--config FILE] [--root DIR] [--json] [-v] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sessions store` | Store a conversation from `--text`, `--file`, `--import` or stdin |
//! | `sessions get <id>` | Retrieve one stored conversation |
//! | `sessions list` | List stored conversations, newest first |
//! | `sessions search "<query>"` | Search stored conversations |
//!
//! ## Examples
//!
//! ```bash
//! # Store from stdin with an explicit topic
//! cat chat.txt | sessions store --topic "auth design"
//!
//! # Import a chat export as structured messages
//! sessions store --import ./exports/chat.json
//!
//! # Retrieve in the compact encoding when possible
//! sessions get auth-design --date 2025-03-04 --format toon
//!
//! # Search a date range
//! sessions search "middleware" --from 2025-03-01 --to 2025-03-31
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use session_harness::config;
use session_harness::get::{self, GetRequest, ListRequest, SessionRetriever};
use session_harness::models::{Conversation, InputFormat, OutputFormat};
use session_harness::search::{self, SearchRequest, SessionSearch};
use session_harness::store::{self, ConversationSource, SessionStore, StoreRequest};
use session_harness::SessionError;

/// Session Harness CLI: a local-first store for AI conversation transcripts.
///
/// The storage root is taken from `--root`, then `SESSION_HARNESS_DIR`,
/// then `[storage].root` in the config file, then
/// `~/.session-harness/sessions`.
#[derive(Parser)]
#[command(
    name = "sessions",
    about = "Session Harness: a local-first store for AI conversation transcripts",
    version,
    long_about = "Session Harness writes conversations as Markdown documents under per-day \
    partitions, one topic folder per conversation, and reads them back from both the current \
    and the legacy flat-file layout. Stored conversations can be listed and searched."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `~/.session-harness/config.toml` when it exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage root for this invocation.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Log debug events to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Store a conversation.
    ///
    /// Reads the conversation from `--text`, `--file`, an export file given
    /// with `--import`, or stdin when none is given.
    Store {
        /// Conversation text.
        #[arg(long, conflicts_with_all = ["file", "import"])]
        text: Option<String>,

        /// Read the conversation from a file.
        #[arg(long, conflicts_with = "import")]
        file: Option<PathBuf>,

        /// Import a chat export (`.json` structured export or Markdown).
        #[arg(long)]
        import: Option<PathBuf>,

        /// Topic; derived from the conversation when omitted.
        #[arg(long)]
        topic: Option<String>,

        /// Input shape: `plain` or `messages` (a JSON array of `{role, content}`).
        #[arg(long)]
        format: Option<String>,

        /// Also write a copy under this root.
        #[arg(long)]
        secondary_root: Option<PathBuf>,
    },

    /// Retrieve a stored conversation.
    Get {
        /// Topic folder name or legacy file name.
        id: String,

        /// Date partition (YYYY-MM-DD). Defaults to the date in a legacy name, else today.
        #[arg(long)]
        date: Option<String>,

        /// Message encoding: `json`, `toon`, or `auto`.
        #[arg(long)]
        format: Option<String>,
    },

    /// List stored conversations, newest first.
    List {
        /// Only this date partition (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,

        /// Maximum number of entries.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search stored conversations.
    Search {
        /// Text to look for (case-insensitive).
        query: String,

        /// Only this date partition (YYYY-MM-DD).
        #[arg(long, conflicts_with_all = ["from", "to"])]
        date: Option<String>,

        /// Earliest date partition, inclusive.
        #[arg(long)]
        from: Option<String>,

        /// Latest date partition, inclusive.
        #[arg(long)]
        to: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json = cli.json;
    if let Err(err) = run(cli).await {
        report(&err, json);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_or_minimal(cli.config.as_deref())?;
    let settings = cfg.resolve(cli.root.as_deref())?;

    match cli.command {
        Commands::Store {
            text,
            file,
            import,
            topic,
            format,
            secondary_root,
        } => {
            let format = format.map(|f| f.parse::<InputFormat>()).transpose()?;
            let conversation = match (text, file, import) {
                (_, _, Some(export)) => ConversationSource::Export(export),
                (Some(text), _, _) => ConversationSource::Inline(Conversation::Text(text)),
                (None, Some(path), None) => {
                    let text = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    ConversationSource::Inline(Conversation::Text(text))
                }
                (None, None, None) => {
                    let mut text = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut text)
                        .await
                        .context("Failed to read conversation from stdin")?;
                    ConversationSource::Inline(Conversation::Text(text))
                }
            };
            let request = StoreRequest {
                conversation: Some(conversation),
                topic,
                format,
                root: None,
                secondary_root,
            };
            store::run_store(&SessionStore::new(settings), request, cli.json).await?;
        }
        Commands::Get { id, date, format } => {
            let format = format.map(|f| f.parse::<OutputFormat>()).transpose()?;
            let request = GetRequest {
                id,
                date,
                format,
                root: None,
            };
            get::run_get(&SessionRetriever::new(settings), request, cli.json).await?;
        }
        Commands::List { date, limit } => {
            let request = ListRequest {
                date,
                limit,
                root: None,
            };
            get::run_list(&SessionRetriever::new(settings), request, cli.json).await?;
        }
        Commands::Search {
            query,
            date,
            from,
            to,
            limit,
        } => {
            let request = SearchRequest {
                query,
                date,
                date_from: from,
                date_to: to,
                limit,
                root: None,
            };
            search::run_search(&SessionSearch::new(settings), request, cli.json).await?;
        }
    }

    Ok(())
}

/// Print a failure. Session errors keep their code; with `--json` the
/// failure envelope goes to stdout.
fn report(err: &anyhow::Error, json: bool) {
    let body = match err.downcast_ref::<SessionError>() {
        Some(e) => e.to_body(),
        None => SessionError::Unknown {
            message: "Command failed".to_string(),
            cause: format!("{:#}", err),
        }
        .to_body(),
    };
    if json {
        match serde_json::to_string_pretty(&body) {
            Ok(text) => println!("{}", text),
            Err(_) => eprintln!("Error: {}", body.message),
        }
        return;
    }
    eprintln!("Error [{}]: {}", body.error, body.message);
    if let Some(details) = body.details.filter(|d| !body.message.contains(d.as_str())) {
        eprintln!("  details: {}", details);
    }
}
