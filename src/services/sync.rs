use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::ServerMode;
use crate::services::codec::looks_like_email;
use crate::stores::Store;
use crate::utils::error::AppError;

pub const SYNC_ENDPOINT_PATH: &str = "/api/sync/validations";
pub const SYNC_API_KEY_HEADER: &str = "X-Sync-API-Key";
pub const LOCAL_SERVER_ID_HEADER: &str = "X-Local-Server-ID";

/// One validation record on the sync wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncValidationItem {
    pub ticket_id: i64,
    pub guard_email: String,
    pub validated_at: DateTime<Utc>,
    pub local_server_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPayload {
    pub validations: Vec<SyncValidationItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPushResult {
    pub synced: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub unsynced_count: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Outcome of ingesting one pushed batch on the global server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub success: bool,
    pub synced: usize,
    pub failed: usize,
}

/// Pushes locally recorded validations to the global server.
///
/// Push is operator-triggered, not a background loop, and there is no
/// automatic retry: a failed push leaves every event pending for the next
/// trigger, which is safe because ingest deduplicates on the natural key.
pub struct SyncCoordinator {
    store: Arc<dyn Store>,
    mode: ServerMode,
    client: reqwest::Client,
    global_server_url: Option<String>,
    api_key: Option<String>,
    // Single-flight guard: concurrent triggers would read overlapping
    // pending sets and push overlapping batches.
    push_lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        mode: ServerMode,
        global_server_url: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::InternalServerError(format!("Failed to build sync client: {e}"))
            })?;

        Ok(Self {
            store,
            mode,
            client,
            global_server_url,
            api_key,
            push_lock: Mutex::new(()),
        })
    }

    /// Unsynced events, as they would go on the wire.
    pub async fn pending(&self) -> Result<Vec<SyncValidationItem>, AppError> {
        let pending = self.store.unsynced().await?;
        Ok(pending
            .into_iter()
            .map(|p| SyncValidationItem {
                ticket_id: p.ticket_id,
                guard_email: p.guard_email,
                validated_at: p.validated_at,
                local_server_id: p.local_server_id,
            })
            .collect())
    }

    /// Drain unsynced events and push them to the global server in one batch.
    ///
    /// All-or-nothing on the local side: a transport failure or non-2xx
    /// response marks nothing as synced. An empty pending set makes no
    /// network call at all.
    pub async fn push(&self) -> Result<SyncPushResult, AppError> {
        if !self.mode.is_local() {
            return Err(AppError::Forbidden(
                "Sync is only available in local mode".to_string(),
            ));
        }

        let (Some(url), Some(api_key)) = (&self.global_server_url, &self.api_key) else {
            return Err(AppError::InternalServerError(
                "GLOBAL_SERVER_URL and GLOBAL_SERVER_SYNC_API_KEY are required to sync"
                    .to_string(),
            ));
        };

        let _flight = self.push_lock.lock().await;

        let pending = self.store.unsynced().await?;
        if pending.is_empty() {
            return Ok(SyncPushResult { synced: 0 });
        }

        let payload = SyncPayload {
            validations: pending
                .iter()
                .map(|p| SyncValidationItem {
                    ticket_id: p.ticket_id,
                    guard_email: p.guard_email.clone(),
                    validated_at: p.validated_at,
                    local_server_id: p.local_server_id.clone(),
                })
                .collect(),
        };

        let endpoint = format!("{}{SYNC_ENDPOINT_PATH}", url.trim_end_matches('/'));
        let response = self
            .client
            .post(&endpoint)
            .header(SYNC_API_KEY_HEADER, api_key)
            .header(
                LOCAL_SERVER_ID_HEADER,
                self.mode.local_server_id().unwrap_or("unknown"),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::SyncTransport(format!("Push to {endpoint} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::SyncTransport(format!(
                "Global server responded {}",
                response.status()
            )));
        }

        let ids: Vec<i64> = pending.iter().map(|p| p.id).collect();
        self.store.mark_synced(&ids, Utc::now()).await?;

        tracing::info!(count = ids.len(), "Pushed validations to global server");

        Ok(SyncPushResult { synced: ids.len() })
    }

    pub async fn status(&self) -> Result<SyncStatus, AppError> {
        Ok(SyncStatus {
            unsynced_count: self.store.unsynced_count().await?,
            last_synced_at: self.store.last_synced_at().await?,
        })
    }
}

/// Ingests pushed batches on the global server, deduplicating idempotently.
pub struct SyncIngest {
    store: Arc<dyn Store>,
}

impl SyncIngest {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Validate the payload shape beyond what serde enforces. Any violation
    /// fails the whole batch before a single row is touched.
    pub fn validate_payload(payload: &SyncPayload) -> Result<(), AppError> {
        for item in &payload.validations {
            if !looks_like_email(&item.guard_email) {
                return Err(AppError::ValidationError(format!(
                    "Malformed guard email '{}'",
                    item.guard_email
                )));
            }
        }
        Ok(())
    }

    /// Upsert each item on its natural key. Items for unknown guards fail
    /// individually and do not abort the rest of the batch; re-ingesting an
    /// already stored item only refreshes its synced_at.
    pub async fn ingest(&self, payload: SyncPayload) -> Result<IngestOutcome, AppError> {
        // One batched lookup for all distinct guard emails
        let mut emails: Vec<String> = payload
            .validations
            .iter()
            .map(|v| v.guard_email.clone())
            .collect();
        emails.sort();
        emails.dedup();

        let guards: HashMap<String, uuid::Uuid> = self
            .store
            .guards_by_emails(&emails)
            .await?
            .into_iter()
            .map(|g| (g.email, g.id))
            .collect();

        let mut synced = 0;
        let mut failed = 0;

        for item in payload.validations {
            let Some(&guard_id) = guards.get(&item.guard_email) else {
                tracing::warn!(
                    guard_email = %item.guard_email,
                    ticket_id = item.ticket_id,
                    "Skipping validation for unknown guard"
                );
                failed += 1;
                continue;
            };

            match self
                .store
                .upsert_synced(
                    item.ticket_id,
                    guard_id,
                    item.validated_at,
                    item.local_server_id,
                    Utc::now(),
                )
                .await
            {
                Ok(()) => synced += 1,
                Err(e) => {
                    tracing::error!(error = %e, ticket_id = item.ticket_id, "Upsert failed");
                    failed += 1;
                }
            }
        }

        Ok(IngestOutcome {
            success: true,
            synced,
            failed,
        })
    }
}
