//! # staffdir CLI
//!
//! The `staffdir` binary is the operator interface for the mirrored
//! directory: database initialization, delta sync, search, record lookup,
//! manual-record administration, and the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! staffdir --config ./config/staffdir.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `staffdir init` | Create the SQLite store schema |
//! | `staffdir sync` | Run one delta-sync pass against the directory |
//! | `staffdir search "<query>"` | Token search over indexed records |
//! | `staffdir get --dn <dn>` | Look up one record by dn or guid |
//! | `staffdir manual add` | Create a manual record (never touched by sync) |
//! | `staffdir manual remove <dn>` | Delete a record and its index entries |
//! | `staffdir status` | Show the last completed sync |
//! | `staffdir serve` | Start the authenticated HTTP API |

mod config;
mod db;
mod directory;
mod get;
mod index;
mod manual;
mod migrate;
mod models;
mod normalize;
mod report;
mod search;
mod server;
mod store;
mod sync;
mod tokenize;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// staffdir: a directory-backed contact lookup service with delta sync.
#[derive(Parser)]
#[command(
    name = "staffdir",
    about = "Directory-backed contact lookup with delta synchronization",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/staffdir.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store schema.
    ///
    /// Creates the SQLite database file and the key-value table. Idempotent.
    Init,

    /// Run one delta-sync pass.
    ///
    /// Loads the known identifiers, binds to the directory source, fetches
    /// the full snapshot, upserts changed records while maintaining the
    /// search index, deletes records no longer present, and records run
    /// metadata. Manual records are never touched.
    Sync {
        /// Bind and fetch normally but write nothing; report the counts
        /// that would result.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search indexed records.
    ///
    /// The query is tokenized like record attributes; a record matches when
    /// it contains every query token.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Retrieve one record by primary or secondary key, as JSON.
    ///
    /// When both keys are given, --dn takes precedence.
    Get {
        /// Distinguished name (primary key).
        #[arg(long)]
        dn: Option<String>,

        /// Canonical guid (secondary key, ignored when --dn is given).
        #[arg(long)]
        guid: Option<String>,
    },

    /// Manage manually-entered records.
    ///
    /// Manual records are created outside of sync and are permanently
    /// exempt from sync upserts and deletes.
    Manual {
        #[command(subcommand)]
        action: ManualAction,
    },

    /// Show metadata for the last completed sync pass.
    Status,

    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` and requires the `[server].auth_token`
    /// bearer token on every API route.
    Serve,
}

#[derive(Subcommand)]
enum ManualAction {
    /// Create a manual record.
    Add {
        /// Display name (required).
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        mail: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        office: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        mobile: Option<String>,
    },
    /// Delete a record and all its index contributions.
    Remove {
        /// Distinguished name of the record to delete.
        dn: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Store initialized successfully.");
        }
        Commands::Sync { dry_run } => {
            sync::run_sync(&cfg, dry_run).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Get { dn, guid } => {
            get::run_get(&cfg, dn, guid).await?;
        }
        Commands::Manual { action } => match action {
            ManualAction::Add {
                display_name,
                mail,
                title,
                department,
                company,
                office,
                phone,
                mobile,
            } => {
                let kv = store::SqliteKv::new(db::connect(&cfg).await?);
                let record = manual::add_manual(
                    &kv,
                    manual::ManualContact {
                        display_name,
                        mail,
                        title,
                        department,
                        company,
                        office,
                        telephone_number: phone,
                        mobile,
                    },
                )
                .await?;
                kv.close().await;
                println!("created {}", record.dn);
            }
            ManualAction::Remove { dn } => {
                let kv = store::SqliteKv::new(db::connect(&cfg).await?);
                let removed = manual::remove(&kv, &dn).await?;
                kv.close().await;
                if removed {
                    println!("removed {dn}");
                } else {
                    anyhow::bail!("record not found: {dn}");
                }
            }
        },
        Commands::Status => {
            get::run_status(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
