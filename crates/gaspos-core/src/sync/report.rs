//! Typed results aggregated by the orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// States an orchestrator run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    CheckingRecovery,
    Recovering,
    Syncing,
    Succeeded,
    Failed,
}

impl RunState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingRecovery => "checking-recovery",
            Self::Recovering => "recovering",
            Self::Syncing => "syncing",
            Self::Succeeded => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Recovery,
    Incremental,
}

/// What happened to one table during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOutcome {
    pub table: String,
    pub pushed: usize,
    pub pulled: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableOutcome {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            pushed: 0,
            pulled: 0,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(mut self, error: impl std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub const fn exchanged(&self) -> usize {
        self.pushed + self.pulled
    }
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_exchanged: u64,
    pub tables: Vec<TableOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
}

impl RunReport {
    pub(crate) fn from_outcomes(
        mode: RunMode,
        started_at: DateTime<Utc>,
        tables: Vec<TableOutcome>,
    ) -> Self {
        let records_exchanged = tables
            .iter()
            .map(|outcome| u64::try_from(outcome.exchanged()).unwrap_or(u64::MAX))
            .fold(0_u64, u64::saturating_add);
        let first_error = tables.iter().find_map(|outcome| {
            outcome
                .error
                .as_ref()
                .map(|error| format!("{}: {error}", outcome.table))
        });
        let state = if first_error.is_some() {
            RunState::Failed
        } else {
            RunState::Succeeded
        };

        Self {
            mode,
            state,
            started_at,
            finished_at: Utc::now(),
            records_exchanged,
            tables,
            first_error,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }

    pub fn failed_tables(&self) -> impl Iterator<Item = &TableOutcome> {
        self.tables.iter().filter(|outcome| !outcome.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_fails_when_any_table_fails() {
        let mut ok = TableOutcome::new("stock");
        ok.pulled = 3;
        let mut failed = TableOutcome::new("users").failed("HTTP 502");
        failed.pushed = 1;

        let report = RunReport::from_outcomes(
            RunMode::Incremental,
            Utc::now(),
            vec![ok, failed, TableOutcome::new("transactions").failed("timeout")],
        );

        assert!(!report.succeeded());
        assert_eq!(report.records_exchanged, 4);
        assert_eq!(report.first_error.as_deref(), Some("users: HTTP 502"));
        assert_eq!(report.failed_tables().count(), 2);
    }

    #[test]
    fn empty_run_succeeds() {
        let report = RunReport::from_outcomes(RunMode::Recovery, Utc::now(), Vec::new());
        assert!(report.succeeded());
        assert_eq!(report.state.as_str(), "success");
    }
}
