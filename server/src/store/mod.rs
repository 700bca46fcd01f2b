use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Entity, EntityPatch, EntityType, Event, EventHost, EventHostDetail, EventPatch, GeoRadius,
    Message, NewEntity, NewEvent, NewMessage, NewUpdate, Rsvp, RsvpStatus, RsvpedEvent, Update,
    User, UserSummary,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No row matched. Carries the user-facing resource name.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A unique constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    /// Anything else the backend reported, passed through verbatim.
    #[error("{0}")]
    Backend(String),
}

/// Filters shared by the event list and the event search.
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Case-insensitive substring of title or description.
    pub term: Option<String>,
    pub starts_from: DateTime<Utc>,
    pub starts_until: Option<DateTime<Utc>>,
    /// Any-overlap; empty means no tag filter.
    pub tags: Vec<String>,
    pub limit: i64,
    pub offset: i64,
}

impl EventQuery {
    pub fn matches(&self, event: &Event) -> bool {
        event.starts_at >= self.starts_from
            && self.starts_until.map_or(true, |until| event.starts_at <= until)
            && event.has_any_tag(&self.tags)
            && self.term.as_deref().map_or(true, |term| {
                contains_ignore_case(&event.title, term)
                    || event
                        .description
                        .as_deref()
                        .is_some_and(|description| contains_ignore_case(description, term))
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    /// Case-insensitive substring of the name only.
    pub name: Option<String>,
    /// Case-insensitive substring of name or description.
    pub term: Option<String>,
    pub kind: Option<EntityType>,
    pub limit: i64,
    pub offset: i64,
}

impl EntityQuery {
    pub fn matches(&self, entity: &Entity) -> bool {
        self.kind.map_or(true, |kind| entity.kind == kind)
            && self
                .name
                .as_deref()
                .map_or(true, |name| contains_ignore_case(&entity.name, name))
            && self.term.as_deref().map_or(true, |term| {
                contains_ignore_case(&entity.name, term)
                    || entity
                        .description
                        .as_deref()
                        .is_some_and(|description| contains_ignore_case(description, term))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventWindow {
    /// Starting at or after the reference time, soonest first.
    Upcoming,
    /// Starting before the reference time, most recent first.
    Past,
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Persistence for everything the API reads and writes. Handlers only see
/// this trait; the concrete store is injected through the app state.
#[async_trait]
pub trait Store: Send + Sync {
    /// Records a user the first time their session is seen.
    async fn ensure_user(&self, id: Uuid, email: &str) -> Result<()>;
    async fn user_summary(&self, id: Uuid) -> Result<Option<UserSummary>>;
    async fn user_by_id(&self, id: Uuid) -> Result<User>;
    /// `None` clears the username. Fails with `Conflict` when another user
    /// holds it.
    async fn set_username(&self, id: Uuid, username: Option<&str>) -> Result<User>;

    async fn list_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>>;
    /// Server-side spatial search. May fail on a backend without the
    /// spatial functions; callers fall back to `list_entities`.
    async fn entities_within_radius(
        &self,
        query: &EntityQuery,
        area: GeoRadius,
    ) -> Result<Vec<Entity>>;
    async fn entity_by_slug(&self, slug: &str) -> Result<Entity>;
    async fn entities_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Entity>>;
    async fn entities_administered_by(&self, user_id: Uuid) -> Result<Vec<Entity>>;
    /// Fails with `Conflict` when the slug is taken.
    async fn create_entity(&self, entity: NewEntity) -> Result<Entity>;
    async fn update_entity(&self, id: Uuid, patch: &EntityPatch) -> Result<Entity>;

    async fn follower_count(&self, entity_id: Uuid) -> Result<i64>;
    async fn is_following(&self, user_id: Uuid, entity_id: Uuid) -> Result<bool>;
    /// Atomically flips the follow row and returns the new state.
    async fn toggle_follow(&self, user_id: Uuid, entity_id: Uuid) -> Result<bool>;

    async fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>>;
    /// Server-side spatial search, see `entities_within_radius`.
    async fn events_within_radius(&self, query: &EventQuery, area: GeoRadius)
        -> Result<Vec<Event>>;
    async fn events_hosted_by(
        &self,
        entity_id: Uuid,
        window: EventWindow,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Event>>;
    async fn event_by_slug(&self, slug: &str) -> Result<Event>;
    /// Hosts of the given events, in host order per event.
    async fn event_hosts(&self, event_ids: &[Uuid]) -> Result<Vec<EventHostDetail>>;
    /// Writes the event and its host rows in one transaction.
    async fn create_event(&self, event: NewEvent, hosts: Vec<EventHost>) -> Result<Event>;
    async fn update_event(&self, id: Uuid, patch: &EventPatch) -> Result<Event>;
    /// Removes the event together with its hosts, RSVPs, saves, updates and
    /// messages.
    async fn delete_event(&self, id: Uuid) -> Result<()>;

    async fn append_updates(&self, updates: Vec<NewUpdate>) -> Result<Vec<Update>>;
    /// Changelog in creation order.
    async fn event_updates(&self, event_id: Uuid) -> Result<Vec<Update>>;

    async fn rsvp_status(&self, user_id: Uuid, event_id: Uuid) -> Result<Option<RsvpStatus>>;
    /// Inserts or overwrites the single (user, event) row.
    async fn upsert_rsvp(&self, user_id: Uuid, event_id: Uuid, status: RsvpStatus)
        -> Result<Rsvp>;
    async fn delete_rsvp(&self, user_id: Uuid, event_id: Uuid) -> Result<()>;

    async fn is_saved(&self, user_id: Uuid, event_id: Uuid) -> Result<bool>;
    /// Atomically flips the save row and returns the new state.
    async fn toggle_save(&self, user_id: Uuid, event_id: Uuid) -> Result<bool>;

    /// Events answered `yes` or `maybe` starting at or after `since`,
    /// soonest first.
    async fn rsvped_events(&self, user_id: Uuid, since: DateTime<Utc>)
        -> Result<Vec<RsvpedEvent>>;
    /// Saved events starting at or after `since`, soonest first.
    async fn saved_events(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Event>>;

    async fn create_message(&self, message: NewMessage) -> Result<Message>;
    /// Newest first.
    async fn messages_for_entities(&self, entity_ids: &[Uuid]) -> Result<Vec<Message>>;
    async fn message_by_id(&self, id: Uuid) -> Result<Message>;
    async fn set_message_read(&self, id: Uuid, read: bool) -> Result<Message>;
}
