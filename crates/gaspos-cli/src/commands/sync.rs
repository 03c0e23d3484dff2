use gaspos_core::sync::{
    HttpSyncTransport, NodeStatusStore, RunMode, RunReport, SyncOrchestrator,
};
use gaspos_core::{NodeStatus, SyncPhase};

use crate::commands::common::{
    format_datetime, load_settings, open_database, open_status_store, NodePaths,
};
use crate::error::CliError;

pub async fn run_sync(if_needed: bool, as_json: bool, paths: &NodePaths) -> Result<(), CliError> {
    let status = open_status_store(&paths.status);
    let settings = load_settings().map_err(|error| record_failure(&status, error))?;

    if if_needed {
        let current = status.read()?;
        if !should_run(&current) {
            println!(
                "Sync not needed (last success {})",
                format_datetime(current.last_synced_at.as_ref())
            );
            return Ok(());
        }
    }

    let transport =
        HttpSyncTransport::new(&settings).map_err(|error| record_failure(&status, error))?;
    let db = open_database(&paths.db)
        .await
        .map_err(|error| record_failure(&status, error))?;
    tracing::info!(master = transport.base_url(), "Starting sync run");

    let report = SyncOrchestrator::new(&db, &status, &transport, &settings)
        .run()
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }

    if report.succeeded() {
        Ok(())
    } else {
        Err(CliError::SyncFailed(
            report
                .first_error
                .unwrap_or_else(|| "sync failed".to_string()),
        ))
    }
}

/// A run that cannot start still counts as a failed sync for the scheduler.
fn record_failure(status: &NodeStatusStore, error: impl Into<CliError>) -> CliError {
    let error = error.into();
    if let Err(status_error) = status.mark_failed(error.to_string()) {
        tracing::warn!("Failed to record sync failure: {status_error}");
    }
    error
}

/// A leftover `syncing` phase is an interrupted run and is retried like `failed`.
pub fn should_run(status: &NodeStatus) -> bool {
    status.is_sync_needed() || status.phase == SyncPhase::Syncing
}

pub fn format_report_lines(report: &RunReport) -> Vec<String> {
    let mode = match report.mode {
        RunMode::Recovery => "recovery",
        RunMode::Incremental => "incremental",
    };
    let mut lines = vec![format!(
        "Sync {} ({mode}): {} records exchanged",
        report.state.as_str(),
        report.records_exchanged
    )];

    for outcome in &report.tables {
        let result = outcome
            .error
            .as_ref()
            .map_or_else(|| "ok".to_string(), |error| format!("FAILED: {error}"));
        lines.push(format!(
            "  {:<18} pushed {:>5}  pulled {:>5}  {result}",
            outcome.table, outcome.pushed, outcome.pulled
        ));
    }
    lines
}
