//! HTTP API for the sync engine
//!
//! Exposes manual triggers, status reporting and connection checks.
//!
//! # Routes
//!
//! - `GET /health` - Liveness, plus whether a run is in progress
//! - `GET /metrics` - Prometheus metrics
//! - `POST /sync/start` - Run a sync now (409 when one is already running)
//! - `GET /sync/stats` - Row counts per status label
//! - `POST /sync/reset` - Mark every row pending
//! - `GET /sheets/validate` - Check the sheet connection
//! - `GET /sheets/data?limit=N` - Parsed rows
//! - `POST /sheets/test-read` - Row count plus the first few rows
//! - `GET /crm/validate` - Check the CRM connection
//! - `GET /crm/fields` - Lead fields the CRM accepts
//! - `POST /crm/test-lead` - Create a lead from a JSON object of CRM fields
//!
//! # Example
//!
//! ```ignore
//! use sheetsync::server::ApiServer;
//!
//! let server = ApiServer::new(engine);
//! server.run("127.0.0.1:3000").await?;
//! ```

use crate::metrics;
use crate::scheduler::Scheduler;
use crate::sync::{LeadPayload, Row, RunResult, StatusSummary, SyncEngine};
use crate::SheetSyncError;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Request body size limit (1MB)
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Rows returned by `/sheets/test-read`
const TEST_READ_ROWS: usize = 5;

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind error: {0}")]
    Bind(String),
}

/// Shared handler state
pub struct AppState {
    engine: Arc<SyncEngine>,
}

/// HTTP server for the sync engine
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            state: Arc::new(AppState { engine }),
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Self::build_router(self.state.clone())
    }

    fn build_router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(prometheus_metrics))
            .route("/sync/start", post(start_sync))
            .route("/sync/stats", get(sync_stats))
            .route("/sync/reset", post(reset_sync))
            .route("/sheets/validate", get(validate_sheet))
            .route("/sheets/data", get(sheet_data))
            .route("/sheets/test-read", post(test_read))
            .route("/crm/validate", get(validate_crm))
            .route("/crm/fields", get(crm_fields))
            .route("/crm/test-lead", post(create_test_lead))
            .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE))
            .with_state(state)
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!(addr = addr, "API server listening");

        axum::serve(listener, Self::build_router(self.state))
            .await
            .map_err(ServerError::Io)
    }

    /// Run the server alongside a scheduler until either one stops
    ///
    /// A server failure such as a port already in use ends the whole
    /// daemon instead of leaving the scheduler running without an API.
    pub async fn run_with_scheduler(
        self,
        addr: &str,
        scheduler: &mut Scheduler,
    ) -> crate::Result<()> {
        tokio::select! {
            result = self.run(addr) => {
                result.map_err(|e| SheetSyncError::Other(e.to_string()))
            }
            outcome = scheduler.run() => outcome,
        }
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Connection check response
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response from `/sheets/test-read`
#[derive(Debug, Serialize)]
pub struct TestReadResponse {
    pub success: bool,
    pub row_count: usize,
    pub rows: Vec<Row>,
}

/// Query for `/sheets/data`
#[derive(Debug, Deserialize)]
pub struct DataQuery {
    pub limit: Option<usize>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: SheetSyncError) -> ApiError {
    let status = match e {
        SheetSyncError::SyncInProgress => StatusCode::CONFLICT,
        SheetSyncError::Validation(_) => StatusCode::BAD_REQUEST,
        SheetSyncError::SourceUnavailable { .. }
        | SheetSyncError::Api(_)
        | SheetSyncError::Lookup(_)
        | SheetSyncError::WriteBack(_)
        | SheetSyncError::Integration(_)
        | SheetSyncError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn validate_response(result: crate::Result<()>) -> Json<ValidateResponse> {
    Json(match result {
        Ok(()) => ValidateResponse {
            valid: true,
            error: None,
        },
        Err(e) => ValidateResponse {
            valid: false,
            error: Some(e.to_string()),
        },
    })
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "sync_running": state.engine.is_running(),
    }))
}

async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}

async fn start_sync(State(state): State<Arc<AppState>>) -> Result<Json<RunResult>, ApiError> {
    tracing::info!("Manual sync triggered via API");
    state.engine.run().await.map(Json).map_err(api_error)
}

async fn sync_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatusSummary>, ApiError> {
    state
        .engine
        .status_summary()
        .await
        .map(Json)
        .map_err(api_error)
}

async fn reset_sync(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let report = state.engine.reset_status().await.map_err(api_error)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "rows_reset": report.rows_reset,
        "failed": report.failed,
    })))
}

async fn validate_sheet(State(state): State<Arc<AppState>>) -> Json<ValidateResponse> {
    validate_response(state.engine.sheet().validate_connection().await)
}

async fn sheet_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DataQuery>,
) -> Result<Json<Vec<Row>>, ApiError> {
    state
        .engine
        .preview(query.limit.unwrap_or(usize::MAX))
        .await
        .map(Json)
        .map_err(api_error)
}

async fn test_read(State(state): State<Arc<AppState>>) -> Result<Json<TestReadResponse>, ApiError> {
    let mut rows = state
        .engine
        .preview(usize::MAX)
        .await
        .map_err(api_error)?;
    let row_count = rows.len();
    rows.truncate(TEST_READ_ROWS);

    Ok(Json(TestReadResponse {
        success: true,
        row_count,
        rows,
    }))
}

async fn validate_crm(State(state): State<Arc<AppState>>) -> Json<ValidateResponse> {
    validate_response(state.engine.crm().validate_connection().await)
}

async fn crm_fields(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .engine
        .crm()
        .lead_fields()
        .await
        .map(Json)
        .map_err(api_error)
}

async fn create_test_lead(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let title_field = state.engine.settings().mapping.title_field.clone();

    let object = if body.is_empty() {
        let mut object = serde_json::Map::new();
        object.insert(
            title_field.clone(),
            serde_json::Value::String(format!(
                "Test lead {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
            )),
        );
        object
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Expected a JSON object of lead fields: {}", e),
                }),
            )
        })?
    };

    let payload = LeadPayload::from_json(title_field, &object);
    let id = state
        .engine
        .crm()
        .create_lead(&payload)
        .await
        .map_err(api_error)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "id": id })),
    ))
}
