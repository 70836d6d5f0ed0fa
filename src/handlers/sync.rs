use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use constant_time_eq::constant_time_eq;
use serde_json::json;

use crate::routes::AppState;
use crate::services::sync::{SyncIngest, SyncPayload, LOCAL_SERVER_ID_HEADER, SYNC_API_KEY_HEADER};
use crate::utils::error::AppError;
use crate::utils::response::success;

/// Operator-triggered push of unsynced validations to the global server.
pub async fn trigger_sync(State(state): State<AppState>) -> Result<Response, AppError> {
    if !state.mode.is_local() {
        return Err(AppError::Forbidden(
            "Sync is only available on local servers".to_string(),
        ));
    }

    let result = state.sync.push().await?;
    Ok(success(result, "Sync completed").into_response())
}

pub async fn sync_status(State(state): State<AppState>) -> Result<Response, AppError> {
    if !state.mode.is_local() {
        return Err(AppError::Forbidden(
            "Sync status is only available on local servers".to_string(),
        ));
    }

    let status = state.sync.status().await?;
    Ok(success(status, "Sync status").into_response())
}

/// Sync ingest endpoint on the global server.
///
/// The checks run strictly in this order: deployment mode, API key, local
/// server id header, then payload schema. A schema violation fails the whole
/// request; per-item guard lookups fail individually inside a well-formed
/// request.
pub async fn ingest_validations(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.mode.is_global() {
        tracing::warn!("Rejected sync push: not running in global mode");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Sync endpoint only available on global server" })),
        )
            .into_response();
    }

    let presented_key = headers
        .get(SYNC_API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if !key_matches(state.sync_api_key.as_deref(), presented_key) {
        tracing::warn!("Rejected sync push: invalid API key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid API key" })),
        )
            .into_response();
    }

    let Some(local_server_id) = headers
        .get(LOCAL_SERVER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Rejected sync push: missing local server id header");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing local server ID" })),
        )
            .into_response();
    };

    // Schema violations anywhere in the body fail the entire request; the
    // pushing side keeps everything pending and may retry the whole batch.
    let payload: SyncPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Sync push body failed schema validation");
            return ingest_failure();
        }
    };
    if let Err(e) = SyncIngest::validate_payload(&payload) {
        tracing::error!(error = %e, "Sync push body failed schema validation");
        return ingest_failure();
    }

    tracing::info!(
        local_server_id,
        batch = payload.validations.len(),
        "Ingesting pushed validations"
    );

    match SyncIngest::new(state.store.clone()).ingest(payload).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Sync ingest failed");
            ingest_failure()
        }
    }
}

fn ingest_failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Sync failed" })),
    )
        .into_response()
}

fn key_matches(configured: Option<&str>, presented: Option<&str>) -> bool {
    match (configured, presented) {
        (Some(configured), Some(presented)) => {
            constant_time_eq(configured.as_bytes(), presented.as_bytes())
        }
        // An unconfigured key rejects every push
        _ => false,
    }
}
