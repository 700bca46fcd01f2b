use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Contact message addressed to an entity, optionally about one event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub event_id: Option<Uuid>,
    pub entity_id: Uuid,
    pub from_user_id: Uuid,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub event_id: Option<Uuid>,
    pub entity_id: Uuid,
    pub from_user_id: Uuid,
    pub message: String,
}
