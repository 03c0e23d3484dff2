use gaspos_core::sync::protocol::StatusReport;
use gaspos_core::sync::{HttpSyncTransport, SyncTransport};

use crate::commands::common::{format_datetime, load_settings, open_exchange, NodePaths};
use crate::error::CliError;

pub async fn run_status(remote: bool, as_json: bool, paths: &NodePaths) -> Result<(), CliError> {
    let settings = load_settings()?;
    let report = if remote {
        HttpSyncTransport::new(&settings)?.status().await?
    } else {
        open_exchange(paths, settings).await?.status().await?
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let node = &report.node;
    let mut lines = vec![
        format!("Node {} ({})", report.node_id, report.role),
        format!("Phase:        {}", node.phase.as_str()),
        format!(
            "Last synced:  {}",
            format_datetime(node.last_synced_at.as_ref())
        ),
        format!("Exchanged:    {} records", node.pending_record_count),
        format!("Retries:      {}", node.retry_count),
    ];
    if let Some(error) = &node.last_error {
        lines.push(format!("Last error:   {error}"));
    }

    lines.push(String::new());
    for table in &report.tables {
        let marker = if table.authoritative { " *" } else { "" };
        lines.push(format!(
            "  {:<18} {:>7} rows  last sync {}{marker}",
            table.table,
            table.record_count,
            format_datetime(table.last_synced_at.as_ref())
        ));
    }
    lines
}
