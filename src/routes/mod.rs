use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::config::{create_cors_layer, create_security_headers_layer, Config, ServerMode};
use crate::handlers::{health_check, sync, validations};
use crate::services::sync::SYNC_ENDPOINT_PATH;
use crate::services::{RedemptionCodec, SyncCoordinator, ValidationRecorder};
use crate::stores::Store;
use crate::utils::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub codec: RedemptionCodec,
    pub mode: ServerMode,
    pub recorder: ValidationRecorder,
    pub sync: Arc<SyncCoordinator>,
    pub sync_api_key: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Result<Self, AppError> {
        let mode = config.server_mode.clone();
        let recorder = ValidationRecorder::new(store.clone(), mode.clone());
        let sync = Arc::new(SyncCoordinator::new(
            store.clone(),
            mode.clone(),
            config.global_server_url.clone(),
            config.sync_api_key.clone(),
            config.sync_timeout,
        )?);

        Ok(Self {
            store,
            codec: RedemptionCodec::new(config.redemption_secret),
            mode,
            recorder,
            sync,
            sync_api_key: config.sync_api_key.clone(),
        })
    }
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/validations/scan", post(validations::scan))
        .route(
            "/api/validations/history/:ticket_id",
            get(validations::history),
        )
        .route("/api/validations", get(validations::list))
        .route("/api/validations/stats", get(validations::stats))
        .route("/api/sync/trigger", post(sync::trigger_sync))
        .route("/api/sync/status", get(sync::sync_status))
        .route(SYNC_ENDPOINT_PATH, post(sync::ingest_validations))
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(state)
}
