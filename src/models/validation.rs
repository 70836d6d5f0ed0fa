use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{Attendee, Ticket, TicketType};

/// One scan-and-record action against a ticket.
///
/// A ticket may accumulate any number of validation events; repeat scans are
/// recorded on purpose so re-entry attempts show up in the history. The only
/// uniqueness constraint is the sync dedup key (ticket_id, guard_id,
/// validated_at).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ValidationEvent {
    pub id: i64,
    pub ticket_id: i64,
    pub guard_id: Uuid,
    pub validated_at: DateTime<Utc>,
    /// Id of the local server that recorded the scan; None when the scan
    /// happened on the global server or no local id is configured.
    pub local_server_id: Option<String>,
    /// None until the event has been pushed to (or ingested by) the global
    /// server.
    pub synced_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new validation event.
#[derive(Debug, Clone)]
pub struct NewValidation {
    pub ticket_id: i64,
    pub guard_id: Uuid,
    pub local_server_id: Option<String>,
}

/// Validation event joined with the recording guard's identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ValidationWithGuard {
    pub id: i64,
    pub ticket_id: i64,
    pub guard_id: Uuid,
    pub validated_at: DateTime<Utc>,
    pub local_server_id: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub guard_name: Option<String>,
    pub guard_email: String,
}

impl ValidationWithGuard {
    pub fn guard_display_name(&self) -> &str {
        self.guard_name.as_deref().unwrap_or(&self.guard_email)
    }
}

/// Unsynced event as gathered for a sync push.
#[derive(Debug, Clone, FromRow)]
pub struct PendingValidation {
    pub id: i64,
    pub ticket_id: i64,
    pub validated_at: DateTime<Utc>,
    pub local_server_id: Option<String>,
    pub guard_email: String,
}

/// Ticket context shown to the guard after a successful scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDetails {
    pub ticket: Ticket,
    pub ticket_type: TicketType,
    pub attendee: Attendee,
}

/// Filter for the admin validation listing.
#[derive(Debug, Clone, Default)]
pub struct ValidationFilter {
    pub limit: i64,
    pub offset: i64,
    pub search: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationPage {
    pub events: Vec<ValidationWithGuard>,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub total_validations: i64,
    pub unique_tickets_validated: i64,
    pub validations_today: i64,
}
