// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP facade
//!
//! Thin adapter from the public routes into the orchestrator, backup
//! engine, and template registry. Handlers parse and validate, delegate,
//! and map the error taxonomy onto status codes; they hold no state of
//! their own.

use crate::env::Settings;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use garcon_backup::{BackupRecord, BackupType, RestoreOutcome};
use garcon_core::{Error, ServerView, SystemClock, TemplateSummary};
use garcon_engine::{
    EventBus, ImportRequest, Orchestrator, PatchRequest, UpdateInitiated,
};
use garcon_store::{fs as store, TemplateRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared handler context.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator<SystemClock>>,
    pub templates: TemplateRegistry,
    pub bus: EventBus,
    pub settings: Arc<Settings>,
}

/// Error taxonomy → status code mapping, with a sanitised message body.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(config))
        .route("/import/folders", get(import_folders))
        .route("/servers", get(list_servers).post(import_server))
        .route("/servers/order", put(set_order))
        .route(
            "/servers/:id",
            get(get_server).patch(patch_server).delete(delete_server),
        )
        .route("/servers/:id/start", post(start_server))
        .route("/servers/:id/stop", post(stop_server))
        .route("/servers/:id/restart", post(restart_server))
        .route("/servers/:id/acknowledge-crash", post(acknowledge_crash))
        .route("/servers/:id/update/initiate", post(update_initiate))
        .route("/servers/:id/update/apply", post(update_apply))
        .route("/servers/:id/update/cancel", post(update_cancel))
        .route("/servers/:id/backups", get(list_backups).post(create_backup))
        .route("/servers/:id/backups/:timestamp", delete(delete_backup))
        .route("/servers/:id/backups/:timestamp/restore", post(restore_backup))
        .route("/templates", get(list_templates))
        .route("/templates/:id", get(get_template))
        .route("/ws", get(crate::ws::upgrade))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Health / config / import
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn config(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.as_ref().clone())
}

async fn import_folders(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(store::list_subdirs(&state.settings.import_dir).await?))
}

// ---------------------------------------------------------------------------
// Servers
// ---------------------------------------------------------------------------

async fn list_servers(State(state): State<AppState>) -> Json<Vec<ServerView>> {
    Json(state.orchestrator.list())
}

async fn import_server(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<(StatusCode, Json<ServerView>)> {
    let view = state.orchestrator.import(request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ServerView>> {
    Ok(Json(state.orchestrator.get(&id)?))
}

async fn patch_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PatchRequest>,
) -> ApiResult<Json<ServerView>> {
    Ok(Json(state.orchestrator.patch(&id, request).await?))
}

async fn delete_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRequest {
    server_ids: Vec<String>,
}

async fn set_order(
    State(state): State<AppState>,
    Json(request): Json<OrderRequest>,
) -> ApiResult<StatusCode> {
    state.orchestrator.set_order(&request.server_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator.start(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stop_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator.stop(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restart_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator.restart(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn acknowledge_crash(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator.acknowledge_crash(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Update protocol
// ---------------------------------------------------------------------------

async fn update_initiate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UpdateInitiated>> {
    Ok(Json(state.orchestrator.initiate_update(&id).await?))
}

async fn update_apply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator.apply_update(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator.cancel_update(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Backups
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CreateBackupRequest {
    #[serde(default)]
    description: Option<String>,
}

async fn list_backups(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<BackupRecord>>> {
    // listing works for deleted servers too; backups outlive the server
    Ok(Json(state.orchestrator.backups().list(&id).await?))
}

async fn create_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<CreateBackupRequest>>,
) -> ApiResult<(StatusCode, Json<BackupRecord>)> {
    // the server must be known; archives of live trees are the engine's call
    state.orchestrator.get(&id)?;
    let description = request.and_then(|Json(r)| r.description);
    let record = state
        .orchestrator
        .backups()
        .create(&id, BackupType::Manual, description)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn delete_backup(
    State(state): State<AppState>,
    Path((id, timestamp)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.orchestrator.backups().delete(&id, &timestamp).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restore_backup(
    State(state): State<AppState>,
    Path((id, timestamp)): Path<(String, String)>,
) -> ApiResult<Json<RestoreOutcome>> {
    Ok(Json(state.orchestrator.restore(&id, &timestamp).await?))
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

async fn list_templates(State(state): State<AppState>) -> Json<Vec<TemplateSummary>> {
    Json(state.templates.list())
}

async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TemplateSummary>> {
    Ok(Json(state.templates.get(&id)?.summary()))
}
