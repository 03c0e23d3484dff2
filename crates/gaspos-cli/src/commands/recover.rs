use gaspos_core::sync::recovery;

use crate::commands::common::{load_settings, open_database, NodePaths};
use crate::commands::sync::run_sync;
use crate::error::CliError;

/// With `check`, only report. Otherwise force a recovery run: clearing every
/// watermark makes the next orchestrator run take the recovery path.
pub async fn run_recover(check: bool, paths: &NodePaths) -> Result<(), CliError> {
    let db = open_database(&paths.db).await?;

    if check {
        let reason = {
            let guard = db.lock().await;
            recovery::check(guard.connection(), db.registry()).await
        };
        match reason {
            Some(reason) => println!("Recovery needed: {reason}"),
            None => println!("Replica is healthy"),
        }
        return Ok(());
    }

    load_settings()?.require_master_url()?;
    let cleared = db.clear_all_watermarks().await?;
    tracing::info!(cleared, "Cleared watermarks for forced recovery");
    drop(db);

    run_sync(false, false, paths).await
}
