use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::models::{
    Attendee, NewValidation, PendingValidation, Ticket, TicketDetails, User, ValidationFilter,
    ValidationPage, ValidationStats, ValidationWithGuard,
};
use crate::utils::error::AppError;

/// Persistence seam for validation events.
///
/// The server uses the Postgres implementation; tests exercise the same
/// contract against [`MemoryStore`]. Both must honor the natural-key upsert
/// semantics in [`ValidationStore::upsert_synced`], the only deduplication
/// mechanism in the sync protocol.
#[async_trait]
pub trait ValidationStore: Send + Sync {
    /// Insert a new event. Always inserts; repeat scans of the same ticket
    /// are a business signal, not a conflict.
    async fn insert(&self, new: NewValidation) -> Result<ValidationWithGuard, AppError>;

    /// All events for a ticket, newest first.
    async fn history(&self, ticket_id: i64) -> Result<Vec<ValidationWithGuard>, AppError>;

    /// Paginated, searchable listing across all events, newest first.
    async fn list(&self, filter: &ValidationFilter) -> Result<ValidationPage, AppError>;

    async fn stats(&self) -> Result<ValidationStats, AppError>;

    /// Events not yet pushed to the global server.
    async fn unsynced(&self) -> Result<Vec<PendingValidation>, AppError>;

    /// Bulk-set synced_at on the given events. Returns the affected count.
    async fn mark_synced(&self, ids: &[i64], synced_at: DateTime<Utc>) -> Result<u64, AppError>;

    async fn unsynced_count(&self) -> Result<i64, AppError>;

    /// Most recent synced_at across all events, if any have synced.
    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Atomic upsert on the natural key (ticket_id, guard_id, validated_at).
    /// An existing row only gets its synced_at refreshed.
    async fn upsert_synced(
        &self,
        ticket_id: i64,
        guard_id: Uuid,
        validated_at: DateTime<Utc>,
        local_server_id: Option<String>,
        synced_at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait GuardStore: Send + Sync {
    async fn guard_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Batched lookup for sync ingest, one query for the whole batch.
    async fn guards_by_emails(&self, emails: &[String]) -> Result<Vec<User>, AppError>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Ticket joined with its type and attendee, for guard-facing display.
    async fn ticket_details(&self, ticket_id: i64) -> Result<Option<TicketDetails>, AppError>;

    async fn ticket_with_attendee(
        &self,
        ticket_id: i64,
    ) -> Result<Option<(Ticket, Attendee)>, AppError>;

    async fn set_redemption_code(&self, ticket_id: i64, code: &str) -> Result<(), AppError>;
}

pub trait Store: ValidationStore + GuardStore + TicketStore {}

impl<T: ValidationStore + GuardStore + TicketStore> Store for T {}

/// Bounds of the current calendar day in server-local time, as UTC:
/// `[start of today, start of tomorrow)`. The upper bound keeps
/// future-dated events from a skew-clocked local server out of the
/// "today" count.
pub(crate) fn local_day_bounds() -> (DateTime<Utc>, DateTime<Utc>) {
    let today = Local::now().date_naive();
    let to_utc = |date: chrono::NaiveDate| {
        date.and_time(chrono::NaiveTime::MIN)
            .and_local_timezone(Local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
    };
    (to_utc(today), to_utc(today + chrono::Days::new(1)))
}
