use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub mod sync;
pub mod validations;

use crate::routes::AppState;
use crate::utils::response::success;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
    mode: String,
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "gatepass-api",
        mode: state.mode.to_string(),
    };

    success(payload, "Health check successful").into_response()
}
