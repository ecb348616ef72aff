//! # Record Sift CLI (`sift`)
//!
//! ## Usage
//!
//! ```bash
//! sift --config ./config/sift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sift search [QUERY]` | Filter and search the records file |
//! | `sift suggest <QUERY> --field <F>` | Autocomplete values of a field |
//! | `sift history list\|remove\|clear` | Manage search history |
//! | `sift batch status <STATUS> <ID>...` | Set a status on many records |
//! | `sift batch delete <ID>...` | Delete many records |
//! | `sift serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use record_sift::progress::ProgressMode;
use record_sift::{batch_cmd, config, history, search, server};

/// Record Sift: search, filter and bulk-edit JSON records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Every section is optional.
#[derive(Parser)]
#[command(
    name = "sift",
    about = "Record Sift: search, filter and bulk-edit JSON records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the records file.
    ///
    /// Bound filters (`field:operator:value`) must all match. Unbound
    /// filters (`field:operator`) take their operand from QUERY and any of
    /// them may match.
    Search {
        /// Free-text query.
        #[arg(default_value = "")]
        query: String,

        /// Filter as `field:operator[:value]`. Repeatable.
        #[arg(long = "filter", short = 'f')]
        filters: Vec<String>,

        /// Do not record this search in history.
        #[arg(long)]
        no_history: bool,

        /// Wrap query matches in the configured highlight markers.
        #[arg(long)]
        highlight: bool,
    },

    /// Suggest values of a field that contain QUERY.
    Suggest {
        query: String,

        #[arg(long)]
        field: String,
    },

    /// Manage search history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Bulk operations on the records file.
    Batch {
        #[command(subcommand)]
        action: BatchAction,

        /// Write a `status,error,data` CSV report to this path.
        #[arg(long, global = true)]
        csv: Option<PathBuf>,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, global = true, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List entries, most recent first.
    List,
    /// Remove one entry by id.
    Remove { id: String },
    /// Remove all entries.
    Clear,
}

#[derive(Subcommand)]
enum BatchAction {
    /// Set STATUS on every listed record.
    Status {
        status: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete every listed record.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Search {
            query,
            filters,
            no_history,
            highlight,
        } => {
            search::run_search(&cfg, &query, &filters, !no_history, highlight).await?;
        }
        Commands::Suggest { query, field } => {
            search::run_suggest(&cfg, &query, &field).await?;
        }
        Commands::History { action } => match action {
            HistoryAction::List => history::list_history(&cfg)?,
            HistoryAction::Remove { id } => history::remove_history(&cfg, &id)?,
            HistoryAction::Clear => history::clear_history(&cfg)?,
        },
        Commands::Batch {
            action,
            csv,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            match action {
                BatchAction::Status { status, ids } => {
                    batch_cmd::run_batch_status(&cfg, &status, ids, csv.as_deref(), progress)
                        .await?;
                }
                BatchAction::Delete { ids } => {
                    batch_cmd::run_batch_delete(&cfg, ids, csv.as_deref(), progress).await?;
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
