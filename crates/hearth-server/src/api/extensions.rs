//! Extension administration endpoints.
//!
//! Authentication is left to whatever sits in front of the host.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use hearth_extension::{DisableOutcome, ExtensionError, ExtensionRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_response(e: ExtensionError) -> ApiError {
    let status = match &e {
        ExtensionError::NotFound(_) => StatusCode::NOT_FOUND,
        ExtensionError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}

// ─── Request / Response types ───────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub enabled_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ExtensionListResponse {
    pub extensions: Vec<ExtensionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestartRequiredResponse {
    pub restart_required: bool,
}

// ─── Handlers ───────────────────────────────────────────────────────────

/// GET /api/admin/extensions returns status and last error of every extension.
pub async fn list_extensions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ExtensionListResponse>, ApiError> {
    let extensions = state
        .extensions
        .list_extensions(query.enabled_only.unwrap_or(false))
        .await
        .map_err(|e| {
            tracing::error!("failed to list extensions: {e}");
            error_response(e)
        })?;

    Ok(Json(ExtensionListResponse { extensions }))
}

/// GET /api/admin/extensions/{namespace}
pub async fn get_extension(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
) -> Result<Json<ExtensionRecord>, ApiError> {
    state
        .extensions
        .get_extension(&namespace)
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /api/admin/extensions/{namespace}/disable. Takes effect on restart.
pub async fn disable_extension(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
) -> Result<Json<DisableOutcome>, ApiError> {
    let outcome = state
        .extensions
        .disable_extension(&namespace)
        .await
        .map_err(|e| {
            tracing::error!(namespace = %namespace, "failed to disable extension: {e}");
            error_response(e)
        })?;

    if outcome.success {
        tracing::info!(namespace = %namespace, "extension disabled via API");
    }
    Ok(Json(outcome))
}

/// GET /api/admin/restart-required
pub async fn restart_required(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RestartRequiredResponse>, ApiError> {
    let restart_required = state
        .extensions
        .restart_required()
        .await
        .map_err(error_response)?;

    Ok(Json(RestartRequiredResponse { restart_required }))
}
