use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::ValidationFilter;
use crate::routes::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub redemption_code: String,
    pub guard_id: Uuid,
}

/// Guard scans a QR code at the entry point. Local-mode only; the global
/// server never validates tickets directly through this endpoint.
pub async fn scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Response, AppError> {
    if !state.mode.is_local() {
        return Err(AppError::Forbidden(
            "Ticket validation is only available on local servers".to_string(),
        ));
    }

    let outcome = state
        .recorder
        .scan(&state.codec, &request.redemption_code, request.guard_id)
        .await?;

    Ok(success(outcome, "Ticket validated").into_response())
}

pub async fn history(
    State(state): State<AppState>,
    Path(ticket_id): Path<i64>,
) -> Result<Response, AppError> {
    let events = state.recorder.history(ticket_id).await?;
    Ok(success(events, "Validation history").into_response())
}

fn default_limit() -> i64 {
    50
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub search: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, AppError> {
    let page = state
        .recorder
        .list_all(ValidationFilter {
            limit: params.limit,
            offset: params.offset,
            search: params.search,
            date_from: params.date_from,
            date_to: params.date_to,
        })
        .await?;

    Ok(success(page, "Validations").into_response())
}

pub async fn stats(State(state): State<AppState>) -> Result<Response, AppError> {
    let stats = state.recorder.stats().await?;
    Ok(success(stats, "Validation stats").into_response())
}
