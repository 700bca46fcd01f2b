use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{nullable, EntityType, GeoPoint, NewUpdate};

/// Fields whose changes are chronicled automatically, in emission order.
pub const TRACKED_FIELDS: [&str; 4] = ["starts_at", "ends_at", "address", "title"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub banner_url: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Any-overlap tag match. An empty filter matches everything.
    pub fn has_any_tag(&self, wanted: &[String]) -> bool {
        wanted.is_empty() || self.tags.iter().any(|tag| wanted.contains(tag))
    }

    /// The creator, or the admin of a host entity allowed to edit.
    pub fn editable_by(&self, user_id: Uuid, hosts: &[EventHostDetail]) -> bool {
        self.created_by == user_id
            || hosts
                .iter()
                .any(|host| host.event_id == self.id && host.can_edit && host.admin_id == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EventHost {
    pub event_id: Uuid,
    pub entity_id: Uuid,
    pub can_edit: bool,
}

/// A host row joined with the entity it points at.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EventHostDetail {
    pub event_id: Uuid,
    pub entity_id: Uuid,
    pub can_edit: bool,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: EntityType,
    pub name: String,
    pub slug: String,
    pub banner_url: Option<String>,
    #[serde(skip)]
    pub admin_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub banner_url: Option<String>,
    pub created_by: Uuid,
}

/// Partial event update. Absent fields stay untouched; nullable fields can
/// be cleared with an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<GeoPoint>>,
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable")]
    pub ends_at: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub banner_url: Option<Option<String>>,
}

/// A tracked field whose incoming value differs from the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old_value: String,
    pub new_value: String,
}

impl FieldChange {
    pub fn into_update(self, event_id: Uuid, author_id: Uuid) -> NewUpdate {
        NewUpdate::auto(event_id, author_id, self.field, self.old_value, self.new_value)
    }
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn text<T: ToString>(value: Option<&T>) -> String {
    value.map(ToString::to_string).unwrap_or_default()
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.address.is_none()
            && self.location.is_none()
            && self.starts_at.is_none()
            && self.ends_at.is_none()
            && self.tags.is_none()
            && self.banner_url.is_none()
    }

    /// Compares each tracked field present in the patch with the stored
    /// event. Values are stringified: timestamps as RFC 3339, null as "".
    /// Setting an end time on an event that had none is not a change;
    /// moving or clearing it is.
    pub fn tracked_changes(&self, current: &Event) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        for field in TRACKED_FIELDS {
            let change = match field {
                "starts_at" => self
                    .starts_at
                    .filter(|incoming| *incoming != current.starts_at)
                    .map(|incoming| (timestamp(&current.starts_at), timestamp(&incoming))),
                "ends_at" => self
                    .ends_at
                    .filter(|incoming| current.ends_at.is_some() && *incoming != current.ends_at)
                    .map(|incoming| {
                        (
                            current.ends_at.as_ref().map(timestamp).unwrap_or_default(),
                            incoming.as_ref().map(timestamp).unwrap_or_default(),
                        )
                    }),
                "address" => self
                    .address
                    .as_ref()
                    .filter(|incoming| **incoming != current.address)
                    .map(|incoming| (text(current.address.as_ref()), text(incoming.as_ref()))),
                "title" => self
                    .title
                    .as_ref()
                    .filter(|incoming| **incoming != current.title)
                    .map(|incoming| (current.title.clone(), incoming.clone())),
                _ => None,
            };

            if let Some((old_value, new_value)) = change {
                changes.push(FieldChange {
                    field,
                    old_value,
                    new_value,
                });
            }
        }

        changes
    }

    pub fn apply(&self, event: &mut Event) {
        if let Some(title) = &self.title {
            event.title = title.clone();
        }
        if let Some(description) = &self.description {
            event.description = description.clone();
        }
        if let Some(address) = &self.address {
            event.address = address.clone();
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(starts_at) = self.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(ends_at) = self.ends_at {
            event.ends_at = ends_at;
        }
        if let Some(tags) = &self.tags {
            event.tags = tags.clone();
        }
        if let Some(banner_url) = &self.banner_url {
            event.banner_url = banner_url.clone();
        }
    }
}
