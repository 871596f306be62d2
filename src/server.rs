//! HTTP server (C9): adapts [`LocalManager`] onto the wire surface in
//! spec.md §6, one route per manager method. Grounded in
//! `eyshoit-commits-alpha`'s `cave-daemon/src/server.rs` (axum `Router`
//! over an `Arc<AppState>`, `TraceLayer` for request logging) — the
//! teacher has no HTTP surface of its own, so this is pack enrichment
//! rather than a teacher-derived module.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::EnclaveError;
use crate::manager::LocalManager;
use crate::model::config::AnySandboxConfig;
use crate::model::{SandboxInfo, SandboxKind, SandboxStatus, ToolResult};

#[derive(Clone)]
struct AppState {
    manager: Arc<LocalManager>,
}

/// Builds the router in spec.md §6's shape, wired to `manager`. Callers
/// (`main.rs`) own the `TcpListener`/`axum::serve` loop.
pub fn router(manager: Arc<LocalManager>) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/sandboxes", post(create_sandbox).get(list_sandboxes))
        .route("/sandboxes/:id", get(get_sandbox).delete(delete_sandbox))
        .route("/sandboxes/:id/stop", post(stop_sandbox))
        .route("/sandboxes/:id/tools", get(get_sandbox_tools))
        .route("/sandboxes/:id/tools/:name", post(execute_tool))
        .route("/pool/init", post(pool_init))
        .route("/pool/tools/:name", post(pool_execute_tool))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { manager })
}

async fn banner() -> &'static str {
    "enclave sandbox orchestration service\n"
}

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(state): State<AppState>) -> Json<crate::manager::stats::ManagerStats> {
    Json(state.manager.stats().await)
}

#[derive(Deserialize)]
struct CreateSandboxRequest {
    kind: SandboxKind,
    config: AnySandboxConfig,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Serialize)]
struct CreateSandboxResponse {
    id: String,
}

async fn create_sandbox(
    State(state): State<AppState>,
    Json(body): Json<CreateSandboxRequest>,
) -> Result<Json<CreateSandboxResponse>, ApiError> {
    let id = state
        .manager
        .create_sandbox(body.kind, body.config, body.id)
        .await?;
    Ok(Json(CreateSandboxResponse { id }))
}

#[derive(Deserialize)]
struct ListSandboxesQuery {
    status: Option<SandboxStatus>,
}

async fn list_sandboxes(
    State(state): State<AppState>,
    Query(query): Query<ListSandboxesQuery>,
) -> Json<Vec<SandboxInfo>> {
    Json(state.manager.list_sandboxes(query.status).await)
}

async fn get_sandbox(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SandboxInfo>, ApiError> {
    state
        .manager
        .get_sandbox_info(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(&id))
}

async fn stop_sandbox(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.manager.stop_sandbox(&id).await {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::not_found(&id))
    }
}

async fn delete_sandbox(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.manager.delete_sandbox(&id).await {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::not_found(&id))
    }
}

async fn get_sandbox_tools(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    Ok(Json(state.manager.get_sandbox_tools(&id).await?))
}

#[derive(Deserialize)]
struct ToolCallRequest {
    #[serde(default)]
    parameters: serde_json::Value,
}

async fn execute_tool(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(body): Json<ToolCallRequest>,
) -> Result<Json<ToolResult>, ApiError> {
    let result = state.manager.execute_tool(&id, &name, body.parameters).await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct PoolInitRequest {
    size: usize,
    kind: SandboxKind,
    config: AnySandboxConfig,
}

async fn pool_init(
    State(state): State<AppState>,
    Json(body): Json<PoolInitRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .manager
        .initialize_pool(body.size, body.kind, body.config)
        .await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct PoolToolCallRequest {
    #[serde(default)]
    parameters: serde_json::Value,
    timeout: Option<u64>,
}

async fn pool_execute_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<PoolToolCallRequest>,
) -> Result<Json<ToolResult>, ApiError> {
    let result = state
        .manager
        .execute_tool_in_pool(
            &name,
            body.parameters,
            body.timeout.map(std::time::Duration::from_secs),
        )
        .await?;
    Ok(Json(result))
}

/// Wraps [`EnclaveError`] for the HTTP boundary: each variant maps to the
/// status code a caller would expect (§7 taxonomy -> standard status codes,
/// per spec.md §6 "standard status codes").
struct ApiError(StatusCode, String);

impl ApiError {
    fn not_found(id: &str) -> Self {
        Self(StatusCode::NOT_FOUND, format!("sandbox '{id}' not found"))
    }
}

impl From<EnclaveError> for ApiError {
    fn from(error: EnclaveError) -> Self {
        let status = match &error {
            EnclaveError::Config(_) => StatusCode::BAD_REQUEST,
            EnclaveError::NotFound(_) => StatusCode::NOT_FOUND,
            EnclaveError::ImageUnavailable(_) => StatusCode::BAD_GATEWAY,
            EnclaveError::SandboxStart(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EnclaveError::Engine(_) => StatusCode::BAD_GATEWAY,
            EnclaveError::ToolExecution(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EnclaveError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EnclaveError::PoolInit { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            EnclaveError::PoolExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}
