use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: i64,
    pub name: String,
    pub event_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: i64,
    pub attendee_id: i64,
    pub ticket_type_id: i64,
    pub redemption_code: Option<String>,
    pub created_at: DateTime<Utc>,
}
