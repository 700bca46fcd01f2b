use serde::{Deserialize, Deserializer};

pub mod entity;
pub mod event;
pub mod geo;
pub mod message;
pub mod rsvp;
pub mod update;
pub mod user;

pub use entity::{Entity, EntityPatch, EntityType, NewEntity};
pub use event::{Event, EventHost, EventHostDetail, EventPatch, FieldChange, NewEvent, TRACKED_FIELDS};
pub use geo::{GeoPoint, GeoPointError, GeoRadius};
pub use message::{Message, NewMessage};
pub use rsvp::{Rsvp, RsvpStatus, RsvpedEvent};
pub use update::{NewUpdate, Update, UpdateType};
pub use user::{User, UserSummary};

/// Distinguishes an absent PATCH field (`None`) from an explicit `null`
/// (`Some(None)`). Use together with `#[serde(default)]`.
pub(crate) fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
