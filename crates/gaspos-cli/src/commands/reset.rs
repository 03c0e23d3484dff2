use crate::commands::common::{open_database, open_status_store, NodePaths};
use crate::error::CliError;

/// Clear one watermark, or every watermark plus the node status with `all`.
pub async fn run_reset(table: Option<&str>, all: bool, paths: &NodePaths) -> Result<(), CliError> {
    let db = open_database(&paths.db).await?;

    if all {
        let cleared = db.clear_all_watermarks().await?;
        open_status_store(&paths.status).reset()?;
        println!("Cleared {cleared} watermarks and reset node status");
        return Ok(());
    }

    let table = table
        .map(str::trim)
        .filter(|table| !table.is_empty())
        .ok_or_else(|| CliError::InvalidInput("pass --table <name> or --all".to_string()))?;
    if db.clear_watermark(table).await? {
        println!("Cleared watermark for {table}");
    } else {
        println!("{table} had no watermark");
    }
    Ok(())
}
