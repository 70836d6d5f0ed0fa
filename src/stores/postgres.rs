use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::models::{
    Attendee, NewValidation, PendingValidation, Ticket, TicketDetails, TicketType, User,
    ValidationFilter, ValidationPage, ValidationStats, ValidationWithGuard,
};
use crate::stores::{local_day_bounds, GuardStore, TicketStore, ValidationStore};
use crate::utils::error::AppError;

const VALIDATION_COLUMNS: &str = "v.id, v.ticket_id, v.guard_id, v.validated_at, \
     v.local_server_id, v.synced_at, u.name AS guard_name, u.email AS guard_email";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends the shared WHERE clauses of the admin listing to a query.
fn push_list_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ValidationFilter) {
    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        qb.push(" AND (a.first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR a.last_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR a.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR a.document_id ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND v.validated_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND v.validated_at <= ").push_bind(to);
    }
}

const LIST_FROM: &str = " FROM ticket_validations v \
     JOIN users u ON u.id = v.guard_id \
     LEFT JOIN tickets t ON t.id = v.ticket_id \
     LEFT JOIN attendees a ON a.id = t.attendee_id \
     WHERE TRUE";

#[async_trait]
impl ValidationStore for PostgresStore {
    async fn insert(&self, new: NewValidation) -> Result<ValidationWithGuard, AppError> {
        let row = sqlx::query_as::<_, ValidationWithGuard>(
            "WITH inserted AS (
                 INSERT INTO ticket_validations (ticket_id, guard_id, local_server_id)
                 VALUES ($1, $2, $3)
                 RETURNING id, ticket_id, guard_id, validated_at, local_server_id, synced_at
             )
             SELECT i.id, i.ticket_id, i.guard_id, i.validated_at, i.local_server_id,
                    i.synced_at, u.name AS guard_name, u.email AS guard_email
             FROM inserted i
             JOIN users u ON u.id = i.guard_id",
        )
        .bind(new.ticket_id)
        .bind(new.guard_id)
        .bind(new.local_server_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn history(&self, ticket_id: i64) -> Result<Vec<ValidationWithGuard>, AppError> {
        let events = sqlx::query_as::<_, ValidationWithGuard>(&format!(
            "SELECT {VALIDATION_COLUMNS}
             FROM ticket_validations v
             JOIN users u ON u.id = v.guard_id
             WHERE v.ticket_id = $1
             ORDER BY v.validated_at DESC"
        ))
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn list(&self, filter: &ValidationFilter) -> Result<ValidationPage, AppError> {
        let mut qb = QueryBuilder::new(format!("SELECT {VALIDATION_COLUMNS}{LIST_FROM}"));
        push_list_filters(&mut qb, filter);
        qb.push(" ORDER BY v.validated_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let events = qb
            .build_query_as::<ValidationWithGuard>()
            .fetch_all(&self.pool)
            .await?;

        let mut count_qb = QueryBuilder::new(format!("SELECT COUNT(*){LIST_FROM}"));
        push_list_filters(&mut count_qb, filter);
        let total: i64 = count_qb.build().fetch_one(&self.pool).await?.get(0);

        Ok(ValidationPage { events, total })
    }

    async fn stats(&self) -> Result<ValidationStats, AppError> {
        let total_validations: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ticket_validations")
                .fetch_one(&self.pool)
                .await?;

        let unique_tickets_validated: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT ticket_id) FROM ticket_validations")
                .fetch_one(&self.pool)
                .await?;

        let (today_start, tomorrow_start) = local_day_bounds();
        let validations_today: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ticket_validations
             WHERE validated_at >= $1 AND validated_at < $2",
        )
        .bind(today_start)
        .bind(tomorrow_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(ValidationStats {
            total_validations,
            unique_tickets_validated,
            validations_today,
        })
    }

    async fn unsynced(&self) -> Result<Vec<PendingValidation>, AppError> {
        let pending = sqlx::query_as::<_, PendingValidation>(
            "SELECT v.id, v.ticket_id, v.validated_at, v.local_server_id,
                    u.email AS guard_email
             FROM ticket_validations v
             JOIN users u ON u.id = v.guard_id
             WHERE v.synced_at IS NULL
             ORDER BY v.validated_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(pending)
    }

    async fn mark_synced(&self, ids: &[i64], synced_at: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE ticket_validations SET synced_at = $1 WHERE id = ANY($2)",
        )
        .bind(synced_at)
        .bind(ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn unsynced_count(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ticket_validations WHERE synced_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let last: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(synced_at) FROM ticket_validations WHERE synced_at IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(last)
    }

    async fn upsert_synced(
        &self,
        ticket_id: i64,
        guard_id: Uuid,
        validated_at: DateTime<Utc>,
        local_server_id: Option<String>,
        synced_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        // Concurrent redelivery of one batch must not create duplicate rows;
        // the unique index on the natural key makes this race-free.
        sqlx::query(
            "INSERT INTO ticket_validations
                 (ticket_id, guard_id, validated_at, local_server_id, synced_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (ticket_id, guard_id, validated_at)
             DO UPDATE SET synced_at = EXCLUDED.synced_at",
        )
        .bind(ticket_id)
        .bind(guard_id)
        .bind(validated_at)
        .bind(local_server_id)
        .bind(synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl GuardStore for PostgresStore {
    async fn guard_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn guards_by_emails(&self, emails: &[String]) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, name, email, created_at, updated_at
             FROM users WHERE email = ANY($1)",
        )
        .bind(emails)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}

#[async_trait]
impl TicketStore for PostgresStore {
    async fn ticket_details(&self, ticket_id: i64) -> Result<Option<TicketDetails>, AppError> {
        let Some((ticket, attendee)) = self.ticket_with_attendee(ticket_id).await? else {
            return Ok(None);
        };

        let ticket_type = sqlx::query_as::<_, TicketType>(
            "SELECT id, name, event_name, created_at FROM ticket_types WHERE id = $1",
        )
        .bind(ticket.ticket_type_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(TicketDetails {
            ticket,
            ticket_type,
            attendee,
        }))
    }

    async fn ticket_with_attendee(
        &self,
        ticket_id: i64,
    ) -> Result<Option<(Ticket, Attendee)>, AppError> {
        let Some(ticket) = sqlx::query_as::<_, Ticket>(
            "SELECT id, attendee_id, ticket_type_id, redemption_code, created_at
             FROM tickets WHERE id = $1",
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let attendee = sqlx::query_as::<_, Attendee>(
            "SELECT id, first_name, last_name, email, document_id, phone,
                    created_at, updated_at
             FROM attendees WHERE id = $1",
        )
        .bind(ticket.attendee_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some((ticket, attendee)))
    }

    async fn set_redemption_code(&self, ticket_id: i64, code: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE tickets SET redemption_code = $1 WHERE id = $2")
            .bind(code)
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
