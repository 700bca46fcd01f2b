use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "update_type", rename_all = "lowercase")]
pub enum UpdateType {
    Auto,
    Manual,
}

/// Changelog entry attached to an event. Never edited once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Update {
    pub id: Uuid,
    pub event_id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: UpdateType,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub message: Option<String>,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUpdate {
    pub id: Uuid,
    pub event_id: Uuid,
    pub kind: UpdateType,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub message: Option<String>,
    pub author_id: Uuid,
}

impl NewUpdate {
    pub fn auto(
        event_id: Uuid,
        author_id: Uuid,
        field: &str,
        old_value: String,
        new_value: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            kind: UpdateType::Auto,
            field_changed: Some(field.to_string()),
            old_value: Some(old_value),
            new_value: Some(new_value),
            message: None,
            author_id,
        }
    }

    pub fn manual(event_id: Uuid, author_id: Uuid, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            kind: UpdateType::Manual,
            field_changed: None,
            old_value: None,
            new_value: None,
            message: Some(message),
            author_id,
        }
    }
}
