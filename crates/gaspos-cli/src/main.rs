//! Gaspos CLI - sync, inspect and recover a branch replica
//!
//! Meant for operators and for schedulers (`gaspos sync --if-needed`).

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands, StockCommands};
use crate::commands::common::NodePaths;
use crate::commands::recover::run_recover;
use crate::commands::reset::run_reset;
use crate::commands::status::run_status;
use crate::commands::stock::{run_stock_add, run_stock_list};
use crate::commands::sync::run_sync;
use crate::commands::tables::run_tables;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(error.exit_code());
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gaspos=info".parse().expect("valid directive"))
                .add_directive("gaspos_core=info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = NodePaths::resolve(cli.db_path, cli.status_path);

    match cli.command {
        Commands::Sync { if_needed, json } => run_sync(if_needed, json, &paths).await?,
        Commands::Status { remote, json } => run_status(remote, json, &paths).await?,
        Commands::Reset { table, all } => run_reset(table.as_deref(), all, &paths).await?,
        Commands::Recover { check } => run_recover(check, &paths).await?,
        Commands::Tables => run_tables(),
        Commands::Stock { command } => match command {
            StockCommands::Add { name, stock, price } => {
                run_stock_add(&name, stock, price, &paths).await?;
            }
            StockCommands::List { limit, json } => run_stock_list(limit, json, &paths).await?,
        },
    }

    Ok(())
}
