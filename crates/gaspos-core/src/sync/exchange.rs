//! Server side of the exchange protocol, independent of the HTTP framework

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::models::SyncRecord;
use crate::services::DatabaseService;
use crate::util::parse_timestamp;

use super::applier::{RecordApplier, RecordError};
use super::changes::ChangeSetReader;
use super::protocol::{
    AcknowledgeRequest, AcknowledgeResponse, MessageResponse, PullResponse, PushResponse,
    ResetRequest, StatusReport, TableInfo, TableStatus, TablesResponse,
};
use super::status_store::NodeStatusStore;
use super::watermark::WatermarkStore;
use super::TableSpec;

/// Acknowledge statuses that mean "the caller committed this table".
const COMMITTED_STATUSES: [&str; 3] = ["completed", "success", "synced"];

/// Handles pull, push, status, reset, tables and acknowledge requests.
#[derive(Clone)]
pub struct ExchangeService {
    db: DatabaseService,
    status: Arc<NodeStatusStore>,
    settings: Arc<SyncSettings>,
}

impl ExchangeService {
    pub fn new(
        db: DatabaseService,
        status: Arc<NodeStatusStore>,
        settings: Arc<SyncSettings>,
    ) -> Self {
        Self {
            db,
            status,
            settings,
        }
    }

    pub const fn database(&self) -> &DatabaseService {
        &self.db
    }

    pub fn status_store(&self) -> &NodeStatusStore {
        &self.status
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Changes of `table` after `since`. An empty `since` means everything.
    pub async fn pull(&self, table: &str, since: Option<&str>) -> Result<PullResponse> {
        self.db.registry().require(table)?;
        let since = match since.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(
                parse_timestamp(raw)
                    .ok_or_else(|| Error::InvalidInput(format!("invalid since timestamp: {raw}")))?,
            ),
            None => None,
        };

        let guard = self.db.lock().await;
        let data = ChangeSetReader::new(guard.connection(), self.db.registry())
            .changes_since(table, since)
            .await?;
        drop(guard);

        tracing::info!(table, records = data.len(), "Served pull");
        Ok(PullResponse {
            success: true,
            total_count: data.len(),
            data,
        })
    }

    /// Apply a pushed batch item by item.
    ///
    /// Invalid items are reported back and never fail the call. The table's
    /// watermark advances when at least one item was applied.
    pub async fn push(&self, table: &str, items: Vec<Value>) -> Result<PushResponse> {
        self.db.registry().require(table)?;
        let total_received = items.len();

        let mut errors = Vec::new();
        let mut records = Vec::with_capacity(items.len());
        let mut numeric_ids = 0_usize;
        for item in items {
            let raw_id = item.get("id").map(|id| match id {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            });
            match SyncRecord::from_wire(item) {
                Ok(record) if record.id.is_numeric() => {
                    if self.settings.strict_ids {
                        errors.push(RecordError::new(
                            raw_id,
                            "numeric record identifiers are not accepted; use node-scoped identifiers",
                        ));
                    } else {
                        numeric_ids += 1;
                        records.push(record);
                    }
                }
                Ok(record) => records.push(record),
                Err(error) => errors.push(RecordError::new(raw_id, error)),
            }
        }
        if numeric_ids > 0 {
            tracing::warn!(
                table,
                count = numeric_ids,
                "Accepted numeric record identifiers; these can collide across nodes"
            );
        }

        let guard = self.db.lock().await;
        let report = RecordApplier::new(guard.connection(), self.db.registry())
            .apply_batch(table, &records)
            .await?;
        errors.extend(report.errors);

        if report.applied > 0 {
            WatermarkStore::new(guard.connection())
                .set(table, Utc::now())
                .await?;
        }
        drop(guard);

        tracing::info!(
            table,
            processed = report.applied,
            total_received,
            rejected = errors.len(),
            "Served push"
        );
        Ok(PushResponse {
            success: true,
            processed: report.applied,
            total_received,
            errors,
        })
    }

    /// Node status plus every table's watermark and row count.
    pub async fn status(&self) -> Result<StatusReport> {
        let node = self.status.read()?;
        let mut tables = Vec::with_capacity(self.db.registry().len());
        for spec in self.db.registry().iter() {
            tables.push(self.describe(spec).await?);
        }

        Ok(StatusReport {
            node_id: self.settings.node_id.clone(),
            role: self.settings.role.as_str().to_string(),
            node,
            tables,
        })
    }

    pub async fn table_status(&self, table: &str) -> Result<TableStatus> {
        let spec = self.db.registry().require(table)?;
        self.describe(spec).await
    }

    async fn describe(&self, spec: &TableSpec) -> Result<TableStatus> {
        Ok(TableStatus {
            table: spec.name().to_string(),
            record_type: spec.record_type().to_string(),
            authoritative: spec.is_authoritative(),
            last_synced_at: self.db.watermark(spec.name()).await?,
            record_count: self.db.count_records(spec.name()).await?,
        })
    }

    /// Clear watermarks for a forced full resync. Node status is untouched.
    pub async fn reset(&self, request: ResetRequest) -> Result<MessageResponse> {
        let table = request
            .table
            .as_deref()
            .map(str::trim)
            .filter(|table| !table.is_empty());

        let message = match (request.all.unwrap_or(false), table) {
            (true, _) => {
                let cleared = self.db.clear_all_watermarks().await?;
                format!("Cleared {cleared} watermarks")
            }
            (false, Some(table)) => {
                self.db.clear_watermark(table).await?;
                format!("Cleared watermark for {table}")
            }
            (false, None) => {
                return Err(Error::InvalidInput(
                    "reset needs a table or all=true".to_string(),
                ))
            }
        };

        tracing::info!("{message}");
        Ok(MessageResponse {
            success: true,
            message,
        })
    }

    pub fn tables(&self) -> TablesResponse {
        let data: Vec<TableInfo> = self
            .db
            .registry()
            .iter()
            .map(|spec| TableInfo {
                table: spec.name().to_string(),
                record_type: spec.record_type().to_string(),
            })
            .collect();
        TablesResponse {
            success: true,
            count: data.len(),
            data,
        }
    }

    /// Record that the caller committed `table`; a committed status advances
    /// the table's watermark to now unless it is already later.
    pub async fn acknowledge(&self, request: AcknowledgeRequest) -> Result<AcknowledgeResponse> {
        let table = request.table.trim();
        self.db.registry().require(table)?;
        let status = request.status.trim().to_ascii_lowercase();
        if status.is_empty() {
            return Err(Error::InvalidInput("acknowledge needs a status".to_string()));
        }

        if COMMITTED_STATUSES.contains(&status.as_str()) {
            self.db.set_watermark(table, Utc::now()).await?;
        }
        tracing::info!(table, status = %status, "Received acknowledge");

        Ok(AcknowledgeResponse {
            success: true,
            table: table.to_string(),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::TableRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    async fn service(strict_ids: bool) -> (ExchangeService, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseService::open_in_memory(TableRegistry::standard())
            .await
            .unwrap();
        let status = Arc::new(NodeStatusStore::new(dir.path().join("status.json")));
        let settings = Arc::new(SyncSettings {
            node_id: "hq".to_string(),
            strict_ids,
            ..SyncSettings::default()
        });
        (ExchangeService::new(db, status, settings), dir)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_reports_missing_identifier_and_advances_watermark() {
        let (service, _dir) = service(false).await;

        let response = service
            .push(
                "transactions",
                vec![
                    json!({"id": "b1-1", "payload": {"total": 10}}),
                    json!({"payload": {"total": 20}}),
                    json!({"id": "b1-3", "payload": {"total": 30}}),
                ],
            )
            .await
            .unwrap();

        assert_eq!(response.processed, 2);
        assert_eq!(response.total_received, 3);
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].error.contains("missing an identifier"));
        assert!(service
            .database()
            .watermark("transactions")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_with_no_successes_leaves_watermark_alone() {
        let (service, _dir) = service(false).await;
        let response = service
            .push("transactions", vec![json!({"id": null})])
            .await
            .unwrap();
        assert_eq!(response.processed, 0);
        assert_eq!(
            service.database().watermark("transactions").await.unwrap(),
            None
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_strict_ids_rejects_numeric_identifiers() {
        let (service, _dir) = service(true).await;
        let response = service
            .push(
                "users",
                vec![json!({"id": 12, "payload": {}}), json!({"id": "hq-7", "payload": {}})],
            )
            .await
            .unwrap();
        assert_eq!(response.processed, 1);
        assert_eq!(response.errors[0].id.as_deref(), Some("12"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_validates_table_and_since() {
        let (service, _dir) = service(false).await;
        service
            .push("stock", vec![json!({"id": "1", "payload": {"stock": 40}})])
            .await
            .unwrap();

        let all = service.pull("stock", Some("")).await.unwrap();
        assert_eq!(all.total_count, 1);
        assert!(all.success);

        let none = service
            .pull("stock", Some("2999-01-01T00:00:00Z"))
            .await
            .unwrap();
        assert_eq!(none.total_count, 0);

        assert!(matches!(
            service.pull("invoices", None).await,
            Err(Error::UnknownTable(_))
        ));
        assert!(matches!(
            service.pull("stock", Some("last tuesday")).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reset_and_acknowledge_manage_watermarks() {
        let (service, _dir) = service(false).await;

        let ack = service
            .acknowledge(AcknowledgeRequest {
                table: "users".to_string(),
                status: "Completed".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(ack.status, "completed");
        assert!(service.database().watermark("users").await.unwrap().is_some());

        service
            .acknowledge(AcknowledgeRequest {
                table: "stock".to_string(),
                status: "partial".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(service.database().watermark("stock").await.unwrap(), None);

        service
            .reset(ResetRequest {
                table: Some("users".to_string()),
                all: None,
            })
            .await
            .unwrap();
        assert_eq!(service.database().watermark("users").await.unwrap(), None);

        assert!(matches!(
            service.reset(ResetRequest::default()).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            service
                .reset(ResetRequest {
                    table: Some("invoices".to_string()),
                    all: None
                })
                .await,
            Err(Error::UnknownTable(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_lists_every_table() {
        let (service, _dir) = service(false).await;
        let report = service.status().await.unwrap();
        assert_eq!(report.node_id, "hq");
        assert_eq!(report.tables.len(), 6);
        assert_eq!(report.tables[0].table, "stock");
        assert!(report.tables[0].authoritative);

        let tables = service.tables();
        assert_eq!(tables.count, 6);
        assert_eq!(tables.data[1].record_type, "SaleTransaction");
    }
}
