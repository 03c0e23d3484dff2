use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use gaspos_core::sync::protocol::{
    AcknowledgeRequest, AcknowledgeResponse, DataResponse, MessageResponse, PullQuery,
    PullResponse, PushRequest, PushResponse, ResetRequest, StatusReport, TableStatus,
    TablesResponse, DEFAULT_TRANSFER_TABLE,
};
use gaspos_core::sync::{
    ExchangeService, HttpSyncTransport, NodeStatusStore, RunReport, SyncOrchestrator,
};
use gaspos_core::DatabaseService;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::ApiKeyVerifier;
use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    exchange: ExchangeService,
    verifier: Arc<ApiKeyVerifier>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: DatabaseService, status: NodeStatusStore) -> Self {
        Self {
            exchange: ExchangeService::new(db, Arc::new(status), Arc::new(config.sync.clone())),
            verifier: Arc::new(ApiKeyVerifier::new(config.api_key.clone())),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let sync_routes = Router::new()
        .route("/pull", get(pull))
        .route("/push", post(push))
        .route("/status", get(status))
        .route("/status/{table}", get(table_status))
        .route("/reset", post(reset))
        .route("/tables", get(tables))
        .route("/acknowledge", post(acknowledge))
        .route("/upload", post(upload))
        .route("/download", get(download))
        .route("/full-sync", post(full_sync))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api/sync", sync_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    node_id: String,
    role: &'static str,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        node_id: state.config.sync.node_id.clone(),
        role: state.config.sync.role.as_str(),
    })
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Err(error) = state.verifier.verify(request.headers()) {
        tracing::warn!(path = %request.uri().path(), "Rejected sync request: {error}");
        return Err(error);
    }
    Ok(next.run(request).await)
}

fn table_or(table: Option<String>, default: Option<&str>) -> Result<String, AppError> {
    table
        .map(|table| table.trim().to_string())
        .filter(|table| !table.is_empty())
        .or_else(|| default.map(str::to_string))
        .ok_or_else(|| AppError::bad_request("table is required"))
}

async fn serve_pull(
    state: &AppState,
    query: PullQuery,
    default_table: Option<&str>,
) -> Result<Json<PullResponse>, AppError> {
    let table = table_or(query.table, default_table)?;
    let response = state
        .exchange
        .pull(&table, query.since.as_deref())
        .await?;
    Ok(Json(response))
}

async fn serve_push(
    state: &AppState,
    request: PushRequest,
    default_table: Option<&str>,
) -> Result<Json<PushResponse>, AppError> {
    let table = table_or(request.table, default_table)?;
    let response = state.exchange.push(&table, request.data).await?;
    Ok(Json(response))
}

async fn pull(
    State(state): State<AppState>,
    query: Result<Query<PullQuery>, QueryRejection>,
) -> Result<Json<PullResponse>, AppError> {
    let Query(query) = query?;
    serve_pull(&state, query, None).await
}

async fn download(
    State(state): State<AppState>,
    query: Result<Query<PullQuery>, QueryRejection>,
) -> Result<Json<PullResponse>, AppError> {
    let Query(query) = query?;
    serve_pull(&state, query, Some(DEFAULT_TRANSFER_TABLE)).await
}

async fn push(
    State(state): State<AppState>,
    body: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, AppError> {
    let Json(request) = body?;
    serve_push(&state, request, None).await
}

async fn upload(
    State(state): State<AppState>,
    body: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, AppError> {
    let Json(request) = body?;
    serve_push(&state, request, Some(DEFAULT_TRANSFER_TABLE)).await
}

async fn status(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<StatusReport>>, AppError> {
    let report = state.exchange.status().await?;
    Ok(Json(DataResponse::ok(report)))
}

async fn table_status(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<DataResponse<TableStatus>>, AppError> {
    let status = state.exchange.table_status(&table).await?;
    Ok(Json(DataResponse::ok(status)))
}

/// Parameters may come from the query string, a JSON body, or both; body
/// fields win.
async fn reset(
    State(state): State<AppState>,
    query: Result<Query<ResetRequest>, QueryRejection>,
    body: Result<Option<Json<ResetRequest>>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Query(query) = query?;
    let body = body?.map(|Json(body)| body).unwrap_or_default();
    let request = ResetRequest {
        table: body.table.or(query.table),
        all: body.all.or(query.all),
    };
    let response = state.exchange.reset(request).await?;
    Ok(Json(response))
}

async fn tables(State(state): State<AppState>) -> Json<TablesResponse> {
    Json(state.exchange.tables())
}

async fn acknowledge(
    State(state): State<AppState>,
    body: Result<Json<AcknowledgeRequest>, JsonRejection>,
) -> Result<Json<AcknowledgeResponse>, AppError> {
    let Json(request) = body?;
    let response = state.exchange.acknowledge(request).await?;
    Ok(Json(response))
}

/// Run the orchestrator against this node's configured master.
async fn full_sync(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<DataResponse<RunReport>>), AppError> {
    let settings = state.exchange.settings();
    let transport = HttpSyncTransport::new(settings)?;
    let report = SyncOrchestrator::new(
        state.exchange.database(),
        state.exchange.status_store(),
        &transport,
        settings,
    )
    .run()
    .await?;

    let succeeded = report.succeeded();
    let status = if succeeded {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    tracing::info!(
        succeeded,
        records = report.records_exchanged,
        "Full sync requested over HTTP finished"
    );
    Ok((
        status,
        Json(DataResponse {
            success: succeeded,
            data: report,
        }),
    ))
}
