use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ServerMode;
use crate::models::{
    NewValidation, TicketDetails, ValidationFilter, ValidationPage, ValidationStats,
    ValidationWithGuard,
};
use crate::services::codec::{AttendeeSnapshot, RedemptionCodec, RedemptionCredential};
use crate::stores::Store;
use crate::utils::error::AppError;

pub const MIN_PAGE_SIZE: i64 = 1;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Result of a guard scanning a redemption code.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    /// True when the ticket had never been validated before this scan.
    /// Guards treat repeat validations as a possible re-entry attempt.
    pub is_first_validation: bool,
    pub previous_validations: Vec<ValidationWithGuard>,
    pub current_validation: ValidationWithGuard,
    pub attendee: AttendeeSnapshot,
    pub ticket_id: i64,
    /// Present when the local database knows the ticket.
    pub ticket_details: Option<TicketDetails>,
}

/// Records scan events and serves their history and aggregates.
#[derive(Clone)]
pub struct ValidationRecorder {
    store: Arc<dyn Store>,
    mode: ServerMode,
}

impl ValidationRecorder {
    pub fn new(store: Arc<dyn Store>, mode: ServerMode) -> Self {
        Self { store, mode }
    }

    /// Decode a scanned code and record the validation for the guard.
    ///
    /// History is read before the insert so the outcome can report whether
    /// this was the ticket's first validation. A `DecodeError` short-circuits
    /// before anything is written.
    pub async fn scan(&self, codec: &RedemptionCodec, code: &str, guard_id: Uuid) -> Result<ScanOutcome, AppError> {
        let credential = codec.decode(code)?;

        if self.store.guard_by_id(guard_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Guard {guard_id} not found")));
        }

        let previous = self.store.history(credential.ticket_id).await?;
        let is_first_validation = previous.is_empty();

        let current = self.record(credential.ticket_id, guard_id).await?;
        let ticket_details = self.store.ticket_details(credential.ticket_id).await?;

        tracing::info!(
            ticket_id = credential.ticket_id,
            guard = %current.guard_display_name(),
            is_first_validation,
            "Ticket validated"
        );

        Ok(ScanOutcome {
            is_first_validation,
            previous_validations: previous,
            ticket_id: credential.ticket_id,
            attendee: credential.attendee,
            current_validation: current,
            ticket_details,
        })
    }

    /// Insert a validation event for the ticket. Always inserts: repeat
    /// scans of one ticket are deliberately kept as the re-entry detection
    /// signal, never collapsed into the earlier event.
    pub async fn record(
        &self,
        ticket_id: i64,
        guard_id: Uuid,
    ) -> Result<ValidationWithGuard, AppError> {
        self.store
            .insert(NewValidation {
                ticket_id,
                guard_id,
                local_server_id: self.mode.local_server_id().map(str::to_string),
            })
            .await
    }

    pub async fn history(&self, ticket_id: i64) -> Result<Vec<ValidationWithGuard>, AppError> {
        self.store.history(ticket_id).await
    }

    pub async fn list_all(&self, filter: ValidationFilter) -> Result<ValidationPage, AppError> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&filter.limit) {
            return Err(AppError::ValidationError(format!(
                "limit must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}"
            )));
        }
        if filter.offset < 0 {
            return Err(AppError::ValidationError("offset must be >= 0".to_string()));
        }
        self.store.list(&filter).await
    }

    pub async fn stats(&self) -> Result<ValidationStats, AppError> {
        self.store.stats().await
    }
}

/// Issues redemption codes for tickets.
#[derive(Clone)]
pub struct TicketIssuer {
    store: Arc<dyn Store>,
    codec: RedemptionCodec,
}

impl TicketIssuer {
    pub fn new(store: Arc<dyn Store>, codec: RedemptionCodec) -> Self {
        Self { store, codec }
    }

    /// Encode the ticket's current attendee snapshot into a redemption code
    /// and store it on the ticket. Re-issuing overwrites the previous code;
    /// codes already rendered as QR images keep their old snapshot.
    pub async fn issue_code(&self, ticket_id: i64) -> Result<String, AppError> {
        let (ticket, attendee) = self
            .store
            .ticket_with_attendee(ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket {ticket_id} not found")))?;

        let credential = RedemptionCredential {
            ticket_id: ticket.id,
            created_at: Some(ticket.created_at),
            attendee: AttendeeSnapshot {
                first_name: attendee.first_name,
                last_name: attendee.last_name,
                email: attendee.email,
                document_id: attendee.document_id,
                phone: attendee.phone,
            },
        };

        let code = self.codec.encode(&credential)?;
        self.store.set_redemption_code(ticket_id, &code).await?;

        Ok(code)
    }
}
