use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gaspos")]
#[command(about = "Replicate a Gaspos branch with its master")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the node status document
    #[arg(long, global = true, value_name = "PATH")]
    pub status_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one sync cycle against the configured master
    Sync {
        /// Only run when the last run failed, never completed, or was interrupted
        #[arg(long)]
        if_needed: bool,
        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show node status and per-table watermarks
    Status {
        /// Ask the configured master instead of reading local state
        #[arg(long)]
        remote: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear watermarks so the next sync resends everything
    ///
    /// Records keep the timestamp of the node that wrote them. With several
    /// branches, a record a branch pushed late can be older than this node's
    /// watermark and is then never pulled; a reset fetches it again.
    Reset {
        /// Table whose watermark is cleared
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        table: Option<String>,
        /// Clear every watermark and the node status
        #[arg(long)]
        all: bool,
    },
    /// Check the local replica and recover it from the master
    Recover {
        /// Only report whether recovery is needed
        #[arg(long)]
        check: bool,
    },
    /// List the synced tables
    Tables,
    /// Manage local stock rows
    Stock {
        #[command(subcommand)]
        command: StockCommands,
    },
}

#[derive(Subcommand)]
pub enum StockCommands {
    /// Record a stock row owned by this node
    Add {
        /// Item name, e.g. "LPG 11kg"
        name: String,
        /// Units on hand
        #[arg(long, default_value = "0")]
        stock: i64,
        /// Unit price
        #[arg(long, default_value = "0")]
        price: f64,
    },
    /// List local stock rows
    List {
        /// Number of rows to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
