use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    Attendee, NewValidation, PendingValidation, Ticket, TicketDetails, TicketType, User,
    ValidationEvent, ValidationFilter, ValidationPage, ValidationStats, ValidationWithGuard,
};
use crate::stores::{local_day_bounds, GuardStore, TicketStore, ValidationStore};
use crate::utils::error::AppError;

/// In-memory store with the same contract as the Postgres implementation,
/// used by tests and demo setups that do not want a database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    validations: Vec<ValidationEvent>,
    users: Vec<User>,
    tickets: Vec<Ticket>,
    ticket_types: Vec<TicketType>,
    attendees: Vec<Attendee>,
    next_validation_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_guard(&self, name: Option<&str>, email: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.map(str::to_string),
            email: email.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .users
            .push(user.clone());
        user
    }

    pub fn add_ticket(&self, ticket_id: i64, attendee: Attendee, ticket_type: TicketType) -> Ticket {
        let ticket = Ticket {
            id: ticket_id,
            attendee_id: attendee.id,
            ticket_type_id: ticket_type.id,
            redemption_code: None,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.attendees.push(attendee);
        inner.ticket_types.push(ticket_type);
        inner.tickets.push(ticket.clone());
        ticket
    }

    pub fn validation_count(&self) -> usize {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .validations
            .len()
    }

    /// Clears synced_at on the given events, simulating a redelivery where
    /// the local side never saw the acknowledgement.
    pub fn reset_synced(&self, ids: &[i64]) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for event in &mut inner.validations {
            if ids.contains(&event.id) {
                event.synced_at = None;
            }
        }
    }

    pub fn events(&self) -> Vec<ValidationEvent> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .validations
            .clone()
    }
}

impl Inner {
    fn joined(&self, event: &ValidationEvent) -> ValidationWithGuard {
        let guard = self.users.iter().find(|u| u.id == event.guard_id);
        ValidationWithGuard {
            id: event.id,
            ticket_id: event.ticket_id,
            guard_id: event.guard_id,
            validated_at: event.validated_at,
            local_server_id: event.local_server_id.clone(),
            synced_at: event.synced_at,
            guard_name: guard.and_then(|g| g.name.clone()),
            guard_email: guard.map(|g| g.email.clone()).unwrap_or_default(),
        }
    }

    fn matches_search(&self, event: &ValidationEvent, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);

        let guard_match = self
            .users
            .iter()
            .find(|u| u.id == event.guard_id)
            .and_then(|g| g.name.as_deref())
            .is_some_and(contains);

        let attendee_match = self
            .tickets
            .iter()
            .find(|t| t.id == event.ticket_id)
            .and_then(|t| self.attendees.iter().find(|a| a.id == t.attendee_id))
            .is_some_and(|a| {
                contains(&a.first_name)
                    || contains(&a.last_name)
                    || contains(&a.email)
                    || contains(&a.document_id)
            });

        guard_match || attendee_match
    }
}

#[async_trait]
impl ValidationStore for MemoryStore {
    async fn insert(&self, new: NewValidation) -> Result<ValidationWithGuard, AppError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.next_validation_id += 1;
        let event = ValidationEvent {
            id: inner.next_validation_id,
            ticket_id: new.ticket_id,
            guard_id: new.guard_id,
            validated_at: Utc::now(),
            local_server_id: new.local_server_id,
            synced_at: None,
        };
        inner.validations.push(event.clone());
        Ok(inner.joined(&event))
    }

    async fn history(&self, ticket_id: i64) -> Result<Vec<ValidationWithGuard>, AppError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut events: Vec<_> = inner
            .validations
            .iter()
            .filter(|e| e.ticket_id == ticket_id)
            .map(|e| inner.joined(e))
            .collect();
        events.sort_by(|a, b| b.validated_at.cmp(&a.validated_at));
        Ok(events)
    }

    async fn list(&self, filter: &ValidationFilter) -> Result<ValidationPage, AppError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut matching: Vec<_> = inner
            .validations
            .iter()
            .filter(|e| match filter.search.as_deref().filter(|s| !s.is_empty()) {
                Some(needle) => inner.matches_search(e, needle),
                None => true,
            })
            .filter(|e| filter.date_from.map_or(true, |from| e.validated_at >= from))
            .filter(|e| filter.date_to.map_or(true, |to| e.validated_at <= to))
            .map(|e| inner.joined(e))
            .collect();
        matching.sort_by(|a, b| b.validated_at.cmp(&a.validated_at));

        let total = matching.len() as i64;
        let events = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();

        Ok(ValidationPage { events, total })
    }

    async fn stats(&self) -> Result<ValidationStats, AppError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let (today_start, tomorrow_start) = local_day_bounds();

        let mut ticket_ids: Vec<i64> = inner.validations.iter().map(|e| e.ticket_id).collect();
        ticket_ids.sort_unstable();
        ticket_ids.dedup();

        Ok(ValidationStats {
            total_validations: inner.validations.len() as i64,
            unique_tickets_validated: ticket_ids.len() as i64,
            validations_today: inner
                .validations
                .iter()
                .filter(|e| e.validated_at >= today_start && e.validated_at < tomorrow_start)
                .count() as i64,
        })
    }

    async fn unsynced(&self) -> Result<Vec<PendingValidation>, AppError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut pending: Vec<_> = inner
            .validations
            .iter()
            .filter(|e| e.synced_at.is_none())
            .map(|e| PendingValidation {
                id: e.id,
                ticket_id: e.ticket_id,
                validated_at: e.validated_at,
                local_server_id: e.local_server_id.clone(),
                guard_email: inner
                    .users
                    .iter()
                    .find(|u| u.id == e.guard_id)
                    .map(|g| g.email.clone())
                    .unwrap_or_default(),
            })
            .collect();
        pending.sort_by(|a, b| a.validated_at.cmp(&b.validated_at));
        Ok(pending)
    }

    async fn mark_synced(&self, ids: &[i64], synced_at: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let mut affected = 0;
        for event in &mut inner.validations {
            if ids.contains(&event.id) {
                event.synced_at = Some(synced_at);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn unsynced_count(&self) -> Result<i64, AppError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .validations
            .iter()
            .filter(|e| e.synced_at.is_none())
            .count() as i64)
    }

    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.validations.iter().filter_map(|e| e.synced_at).max())
    }

    async fn upsert_synced(
        &self,
        ticket_id: i64,
        guard_id: Uuid,
        validated_at: DateTime<Utc>,
        local_server_id: Option<String>,
        synced_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if let Some(existing) = inner.validations.iter_mut().find(|e| {
            e.ticket_id == ticket_id && e.guard_id == guard_id && e.validated_at == validated_at
        }) {
            existing.synced_at = Some(synced_at);
            return Ok(());
        }
        inner.next_validation_id += 1;
        let event = ValidationEvent {
            id: inner.next_validation_id,
            ticket_id,
            guard_id,
            validated_at,
            local_server_id,
            synced_at: Some(synced_at),
        };
        inner.validations.push(event);
        Ok(())
    }
}

#[async_trait]
impl GuardStore for MemoryStore {
    async fn guard_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn guards_by_emails(&self, emails: &[String]) -> Result<Vec<User>, AppError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .users
            .iter()
            .filter(|u| emails.contains(&u.email))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn ticket_details(&self, ticket_id: i64) -> Result<Option<TicketDetails>, AppError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let Some(ticket) = inner.tickets.iter().find(|t| t.id == ticket_id).cloned() else {
            return Ok(None);
        };
        let ticket_type = inner
            .ticket_types
            .iter()
            .find(|tt| tt.id == ticket.ticket_type_id)
            .cloned();
        let attendee = inner
            .attendees
            .iter()
            .find(|a| a.id == ticket.attendee_id)
            .cloned();
        match (ticket_type, attendee) {
            (Some(ticket_type), Some(attendee)) => Ok(Some(TicketDetails {
                ticket,
                ticket_type,
                attendee,
            })),
            _ => Ok(None),
        }
    }

    async fn ticket_with_attendee(
        &self,
        ticket_id: i64,
    ) -> Result<Option<(Ticket, Attendee)>, AppError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let Some(ticket) = inner.tickets.iter().find(|t| t.id == ticket_id).cloned() else {
            return Ok(None);
        };
        let attendee = inner
            .attendees
            .iter()
            .find(|a| a.id == ticket.attendee_id)
            .cloned();
        Ok(attendee.map(|a| (ticket, a)))
    }

    async fn set_redemption_code(&self, ticket_id: i64, code: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if let Some(ticket) = inner.tickets.iter_mut().find(|t| t.id == ticket_id) {
            ticket.redemption_code = Some(code.to_string());
        }
        Ok(())
    }
}
