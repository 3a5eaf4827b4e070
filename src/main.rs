//! # newsdesk CLI
//!
//! The `newsdesk` binary indexes crawled news articles and answers
//! questions about them.
//!
//! ## Usage
//!
//! ```bash
//! newsdesk --config ./config/newsdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `newsdesk init` | Create both SQLite databases and their tables |
//! | `newsdesk import <file>` | Load articles from a JSON Lines file into the store |
//! | `newsdesk index` | Embed new and changed articles into the vector index |
//! | `newsdesk ask "<question>"` | Answer a question from the indexed articles |
//! | `newsdesk status` | Show article and index counts |
//!
//! Command output goes to stdout. Logs and progress go to stderr.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use newsdesk::answer::{self, GenerationMode};
use newsdesk::progress::ProgressMode;
use newsdesk::{articles, config, indexer, logging, migrate, status};

/// Incremental news indexing and grounded question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/newsdesk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "newsdesk",
    about = "Incremental news article indexing and grounded question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/newsdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the article store and the vector index.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Import articles from a JSON Lines file.
    ///
    /// Each line is one article object with `guid`, `title`, `url`,
    /// `published`, `modified` and `text`. Existing guids are replaced.
    Import {
        /// Path to the `.jsonl` file.
        path: PathBuf,
    },

    /// Index new and changed articles.
    ///
    /// Unchanged articles are skipped by content fingerprint. Failures on
    /// single articles are counted and do not stop the run.
    Index {
        /// Only consider the N most recently fetched articles.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress on stderr: auto, off, human, json.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressMode,
    },

    /// Answer a question from the indexed articles.
    ///
    /// Without PROMPT, one line is read from stdin.
    Ask {
        /// The question.
        prompt: Option<String>,

        /// Number of articles to retrieve (defaults to `[retrieval] k`).
        #[arg(short, long)]
        k: Option<usize>,

        /// Print the answer as it is generated. Ctrl-C stops it.
        #[arg(long)]
        stream: bool,
    },

    /// Show article and index counts.
    Status,
}

/// Read the question from stdin, prompting when interactive.
fn read_question() -> Result<String> {
    let stdin = std::io::stdin();
    if atty::is(atty::Stream::Stdin) {
        print!("Question: ");
        std::io::stdout().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Databases initialized successfully.");
        }
        Commands::Import { path } => {
            articles::run_import(&cfg.db.path, &path).await?;
        }
        Commands::Index { limit, progress } => {
            indexer::run_index(&cfg, limit, progress.reporter()).await?;
        }
        Commands::Ask { prompt, k, stream } => {
            let query = match prompt {
                Some(p) => p.trim().to_string(),
                None => read_question()?,
            };
            if query.is_empty() {
                bail!("No question given");
            }
            let k = k.unwrap_or(cfg.retrieval.k);
            if k == 0 {
                bail!("-k must be at least 1");
            }
            let mode = if stream {
                GenerationMode::Stream
            } else {
                GenerationMode::Batch
            };
            answer::run_ask(&cfg, &query, k, mode).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
    }

    Ok(())
}
