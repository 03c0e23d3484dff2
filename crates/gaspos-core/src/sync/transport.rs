//! Transport client for a remote node's exchange endpoints

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::models::SyncRecord;
use crate::util::{compact_text, format_timestamp};

use super::protocol::{
    AcknowledgeRequest, DataResponse, PullPayload, PushBody, PushResponse, StatusReport,
    API_KEY_HEADER,
};

/// Calls a remote node makes available to the orchestrator.
///
/// Any timeout, connection failure or non-2xx response is an `Err`.
#[allow(async_fn_in_trait)]
pub trait SyncTransport {
    /// Records of `table` modified after `since` on the remote (everything for `None`).
    async fn pull(&self, table: &str, since: Option<DateTime<Utc>>) -> Result<Vec<SyncRecord>>;

    /// Send local changes; per-record rejections come back in the response.
    async fn push(&self, table: &str, records: &[SyncRecord]) -> Result<PushResponse>;

    /// Tell the remote that the caller committed `table`.
    async fn acknowledge(&self, table: &str, status: &str) -> Result<()>;

    async fn status(&self) -> Result<StatusReport>;
}

/// HTTP implementation talking to `{master_url}/api/sync`.
#[derive(Clone)]
pub struct HttpSyncTransport {
    base_url: String,
    api_key: String,
    client: Client,
}

impl std::fmt::Debug for HttpSyncTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncTransport")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpSyncTransport {
    /// Build a client for the configured master.
    pub fn new(settings: &SyncSettings) -> Result<Self> {
        let base_url = format!("{}/api/sync", settings.require_master_url()?);
        let api_key = settings.require_api_key()?.to_string();
        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .build()?;

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Transport {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }
}

impl SyncTransport for HttpSyncTransport {
    async fn pull(&self, table: &str, since: Option<DateTime<Utc>>) -> Result<Vec<SyncRecord>> {
        let since = since.as_ref().map(format_timestamp).unwrap_or_default();
        let request = self
            .client
            .get(self.endpoint("pull"))
            .query(&[("table", table), ("since", since.as_str())]);

        let payload = self.send(request).await?.json::<PullPayload>().await?;
        let records = payload.into_records();
        tracing::debug!(table, records = records.len(), "Pulled remote changes");
        Ok(records)
    }

    async fn push(&self, table: &str, records: &[SyncRecord]) -> Result<PushResponse> {
        let request = self.client.post(self.endpoint("push")).json(&PushBody {
            table,
            data: records,
        });
        let response = self.send(request).await?.json::<PushResponse>().await?;
        tracing::debug!(
            table,
            processed = response.processed,
            rejected = response.errors.len(),
            "Pushed local changes"
        );
        Ok(response)
    }

    async fn acknowledge(&self, table: &str, status: &str) -> Result<()> {
        let request = self
            .client
            .post(self.endpoint("acknowledge"))
            .json(&AcknowledgeRequest {
                table: table.to_string(),
                status: status.to_string(),
            });
        self.send(request).await?;
        Ok(())
    }

    async fn status(&self) -> Result<StatusReport> {
        let request = self.client.get(self.endpoint("status"));
        let response = self
            .send(request)
            .await?
            .json::<DataResponse<StatusReport>>()
            .await?;
        Ok(response.data)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SyncSettings {
        SyncSettings {
            master_url: Some("https://hq.example.com".to_string()),
            api_key: Some("shared-secret".to_string()),
            ..SyncSettings::default()
        }
    }

    #[test]
    fn new_requires_master_url_and_key() {
        assert!(HttpSyncTransport::new(&SyncSettings::default()).is_err());

        let transport = HttpSyncTransport::new(&settings()).unwrap();
        assert_eq!(transport.base_url(), "https://hq.example.com/api/sync");
        assert_eq!(
            transport.endpoint("/pull"),
            "https://hq.example.com/api/sync/pull"
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let transport = HttpSyncTransport::new(&settings()).unwrap();
        let debug = format!("{transport:?}");
        assert!(!debug.contains("shared-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(
                StatusCode::UNAUTHORIZED,
                r#"{"error":"unauthorized","message":"Invalid sync API key"}"#
            ),
            "Invalid sync API key"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "Bad Gateway");
        assert_eq!(parse_api_error(StatusCode::NOT_FOUND, "nope"), "nope");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_master_is_an_http_error() {
        let transport = HttpSyncTransport::new(&SyncSettings {
            master_url: Some("http://127.0.0.1:9".to_string()),
            api_key: Some("k".to_string()),
            timeout: std::time::Duration::from_secs(2),
            ..SyncSettings::default()
        })
        .unwrap();

        let error = transport.pull("stock", None).await.unwrap_err();
        assert!(error.is_transport());
    }
}
