use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{nullable, GeoPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "entity_type", rename_all = "lowercase")]
pub enum EntityType {
    Organization,
    Venue,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Organization => "organization",
            EntityType::Venue => "venue",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organization" => Ok(EntityType::Organization),
            "venue" => Ok(EntityType::Venue),
            _ => Err(()),
        }
    }
}

/// An organization or venue. Exactly one user administers it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entity {
    pub id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: EntityType,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub banner_url: Option<String>,
    pub admin_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEntity {
    pub id: Uuid,
    pub kind: EntityType,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub banner_url: Option<String>,
    pub admin_id: Uuid,
}

/// Editable entity fields. `type`, `slug`, `admin_id` and `id` are not
/// listed and therefore ignored when present in a request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<GeoPoint>>,
    #[serde(default, deserialize_with = "nullable")]
    pub banner_url: Option<Option<String>>,
}

impl EntityPatch {
    pub fn apply(&self, entity: &mut Entity) {
        if let Some(name) = &self.name {
            entity.name = name.clone();
        }
        if let Some(description) = &self.description {
            entity.description = description.clone();
        }
        if let Some(address) = &self.address {
            entity.address = address.clone();
        }
        if let Some(location) = self.location {
            entity.location = location;
        }
        if let Some(banner_url) = &self.banner_url {
            entity.banner_url = banner_url.clone();
        }
    }
}
