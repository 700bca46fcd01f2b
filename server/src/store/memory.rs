use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{EntityQuery, EventQuery, EventWindow, Result, Store, StoreError};
use crate::models::{
    Entity, EntityPatch, Event, EventHost, EventHostDetail, EventPatch, GeoRadius, Message,
    NewEntity, NewEvent, NewMessage, NewUpdate, Rsvp, RsvpStatus, RsvpedEvent, Update, User,
    UserSummary,
};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    entities: Vec<Entity>,
    events: Vec<Event>,
    hosts: Vec<EventHost>,
    rsvps: Vec<Rsvp>,
    saves: Vec<(Uuid, Uuid)>,
    follows: Vec<(Uuid, Uuid)>,
    updates: Vec<Update>,
    messages: Vec<Message>,
}

/// In-process store with the same constraints as the Postgres schema.
/// Every operation runs under one lock, so each call is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    spatial_unavailable: AtomicBool,
    changelog_unavailable: AtomicBool,
}

fn page<T>(rows: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    rows.skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the radius queries fail, like a backend whose spatial
    /// functions have not been migrated yet.
    pub fn disable_spatial(&self) {
        self.spatial_unavailable.store(true, Ordering::SeqCst);
    }

    /// Makes changelog writes fail.
    pub fn disable_changelog(&self) {
        self.changelog_unavailable.store(true, Ordering::SeqCst);
    }

    fn spatial_available(&self) -> Result<()> {
        if self.spatial_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(
                "function events_within_radius does not exist".to_string(),
            ));
        }
        Ok(())
    }

    fn sorted_events(tables: &Tables, query: &EventQuery) -> Vec<Event> {
        let mut events: Vec<_> = tables
            .events
            .iter()
            .filter(|event| query.matches(event))
            .cloned()
            .collect();
        events.sort_by_key(|event| event.starts_at);
        events
    }

    fn sorted_entities(tables: &Tables, query: &EntityQuery) -> Vec<Entity> {
        let mut entities: Vec<_> = tables
            .entities
            .iter()
            .filter(|entity| query.matches(entity))
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        entities
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ensure_user(&self, id: Uuid, email: &str) -> Result<()> {
        let mut tables = self.tables.lock();
        if !tables.users.iter().any(|user| user.id == id) {
            tables.users.push(User {
                id,
                email: email.to_string(),
                username: None,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn user_summary(&self, id: Uuid) -> Result<Option<UserSummary>> {
        let tables = self.tables.lock();
        Ok(tables
            .users
            .iter()
            .find(|user| user.id == id)
            .map(UserSummary::from))
    }

    async fn user_by_id(&self, id: Uuid) -> Result<User> {
        let tables = self.tables.lock();
        tables
            .users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or(StoreError::NotFound("User"))
    }

    async fn set_username(&self, id: Uuid, username: Option<&str>) -> Result<User> {
        let mut tables = self.tables.lock();
        if let Some(username) = username {
            if tables
                .users
                .iter()
                .any(|user| user.id != id && user.username.as_deref() == Some(username))
            {
                return Err(StoreError::Conflict(format!(
                    "username '{}' already exists",
                    username
                )));
            }
        }

        let user = tables
            .users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(StoreError::NotFound("User"))?;
        user.username = username.map(str::to_string);
        Ok(user.clone())
    }

    async fn list_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>> {
        let tables = self.tables.lock();
        let entities = Self::sorted_entities(&tables, query);
        Ok(page(entities.into_iter(), query.limit, query.offset))
    }

    async fn entities_within_radius(
        &self,
        query: &EntityQuery,
        area: GeoRadius,
    ) -> Result<Vec<Entity>> {
        self.spatial_available()?;
        let tables = self.tables.lock();
        let entities = Self::sorted_entities(&tables, query)
            .into_iter()
            .filter(|entity| entity.location.is_some_and(|point| area.contains(&point)));
        Ok(page(entities, query.limit, query.offset))
    }

    async fn entity_by_slug(&self, slug: &str) -> Result<Entity> {
        let tables = self.tables.lock();
        tables
            .entities
            .iter()
            .find(|entity| entity.slug == slug)
            .cloned()
            .ok_or(StoreError::NotFound("Entity"))
    }

    async fn entities_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Entity>> {
        let tables = self.tables.lock();
        Ok(tables
            .entities
            .iter()
            .filter(|entity| ids.contains(&entity.id))
            .cloned()
            .collect())
    }

    async fn entities_administered_by(&self, user_id: Uuid) -> Result<Vec<Entity>> {
        let tables = self.tables.lock();
        let mut entities: Vec<_> = tables
            .entities
            .iter()
            .filter(|entity| entity.admin_id == user_id)
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entities)
    }

    async fn create_entity(&self, new: NewEntity) -> Result<Entity> {
        let mut tables = self.tables.lock();
        if tables.entities.iter().any(|entity| entity.slug == new.slug) {
            return Err(StoreError::Conflict(format!(
                "entity slug '{}' already exists",
                new.slug
            )));
        }

        let entity = Entity {
            id: new.id,
            kind: new.kind,
            name: new.name,
            slug: new.slug,
            description: new.description,
            address: new.address,
            location: new.location,
            banner_url: new.banner_url,
            admin_id: new.admin_id,
            created_at: Utc::now(),
        };
        tables.entities.push(entity.clone());
        Ok(entity)
    }

    async fn update_entity(&self, id: Uuid, patch: &EntityPatch) -> Result<Entity> {
        let mut tables = self.tables.lock();
        let entity = tables
            .entities
            .iter_mut()
            .find(|entity| entity.id == id)
            .ok_or(StoreError::NotFound("Entity"))?;
        patch.apply(entity);
        Ok(entity.clone())
    }

    async fn follower_count(&self, entity_id: Uuid) -> Result<i64> {
        let tables = self.tables.lock();
        Ok(tables
            .follows
            .iter()
            .filter(|(_, entity)| *entity == entity_id)
            .count() as i64)
    }

    async fn is_following(&self, user_id: Uuid, entity_id: Uuid) -> Result<bool> {
        let tables = self.tables.lock();
        Ok(tables.follows.contains(&(user_id, entity_id)))
    }

    async fn toggle_follow(&self, user_id: Uuid, entity_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock();
        let key = (user_id, entity_id);
        if let Some(index) = tables.follows.iter().position(|row| *row == key) {
            tables.follows.remove(index);
            Ok(false)
        } else {
            tables.follows.push(key);
            Ok(true)
        }
    }

    async fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let tables = self.tables.lock();
        let events = Self::sorted_events(&tables, query);
        Ok(page(events.into_iter(), query.limit, query.offset))
    }

    async fn events_within_radius(
        &self,
        query: &EventQuery,
        area: GeoRadius,
    ) -> Result<Vec<Event>> {
        self.spatial_available()?;
        let tables = self.tables.lock();
        let events = Self::sorted_events(&tables, query)
            .into_iter()
            .filter(|event| event.location.is_some_and(|point| area.contains(&point)));
        Ok(page(events, query.limit, query.offset))
    }

    async fn events_hosted_by(
        &self,
        entity_id: Uuid,
        window: EventWindow,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Event>> {
        let tables = self.tables.lock();
        let mut events: Vec<_> = tables
            .events
            .iter()
            .filter(|event| {
                tables
                    .hosts
                    .iter()
                    .any(|host| host.event_id == event.id && host.entity_id == entity_id)
            })
            .filter(|event| match window {
                EventWindow::Upcoming => event.starts_at >= now,
                EventWindow::Past => event.starts_at < now,
            })
            .cloned()
            .collect();

        match window {
            EventWindow::Upcoming => events.sort_by_key(|event| event.starts_at),
            EventWindow::Past => events.sort_by_key(|event| Reverse(event.starts_at)),
        }

        Ok(page(events.into_iter(), limit, 0))
    }

    async fn event_by_slug(&self, slug: &str) -> Result<Event> {
        let tables = self.tables.lock();
        tables
            .events
            .iter()
            .find(|event| event.slug == slug)
            .cloned()
            .ok_or(StoreError::NotFound("Event"))
    }

    async fn event_hosts(&self, event_ids: &[Uuid]) -> Result<Vec<EventHostDetail>> {
        let tables = self.tables.lock();
        let mut details = Vec::new();

        for host in tables
            .hosts
            .iter()
            .filter(|host| event_ids.contains(&host.event_id))
        {
            let entity = tables
                .entities
                .iter()
                .find(|entity| entity.id == host.entity_id)
                .ok_or(StoreError::NotFound("Entity"))?;

            details.push(EventHostDetail {
                event_id: host.event_id,
                entity_id: host.entity_id,
                can_edit: host.can_edit,
                kind: entity.kind,
                name: entity.name.clone(),
                slug: entity.slug.clone(),
                banner_url: entity.banner_url.clone(),
                admin_id: entity.admin_id,
            });
        }

        Ok(details)
    }

    async fn create_event(&self, new: NewEvent, hosts: Vec<EventHost>) -> Result<Event> {
        let mut tables = self.tables.lock();
        if tables.events.iter().any(|event| event.slug == new.slug) {
            return Err(StoreError::Conflict(format!(
                "event slug '{}' already exists",
                new.slug
            )));
        }
        if let Some(missing) = hosts
            .iter()
            .find(|host| !tables.entities.iter().any(|entity| entity.id == host.entity_id))
        {
            return Err(StoreError::Backend(format!(
                "host entity {} does not exist",
                missing.entity_id
            )));
        }

        let event = Event {
            id: new.id,
            title: new.title,
            slug: new.slug,
            description: new.description,
            address: new.address,
            location: new.location,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            tags: new.tags,
            banner_url: new.banner_url,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        tables.events.push(event.clone());
        tables.hosts.extend(hosts);
        Ok(event)
    }

    async fn update_event(&self, id: Uuid, patch: &EventPatch) -> Result<Event> {
        let mut tables = self.tables.lock();
        let event = tables
            .events
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or(StoreError::NotFound("Event"))?;
        patch.apply(event);
        Ok(event.clone())
    }

    async fn delete_event(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock();
        let before = tables.events.len();
        tables.events.retain(|event| event.id != id);
        if tables.events.len() == before {
            return Err(StoreError::NotFound("Event"));
        }

        tables.hosts.retain(|host| host.event_id != id);
        tables.rsvps.retain(|rsvp| rsvp.event_id != id);
        tables.saves.retain(|(_, event)| *event != id);
        tables.updates.retain(|update| update.event_id != id);
        tables.messages.retain(|message| message.event_id != Some(id));
        Ok(())
    }

    async fn append_updates(&self, updates: Vec<NewUpdate>) -> Result<Vec<Update>> {
        if self.changelog_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("updates table unavailable".to_string()));
        }

        let mut tables = self.tables.lock();
        let now = Utc::now();
        let rows: Vec<Update> = updates
            .into_iter()
            .map(|new| Update {
                id: new.id,
                event_id: new.event_id,
                kind: new.kind,
                field_changed: new.field_changed,
                old_value: new.old_value,
                new_value: new.new_value,
                message: new.message,
                author_id: new.author_id,
                created_at: now,
            })
            .collect();
        tables.updates.extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn event_updates(&self, event_id: Uuid) -> Result<Vec<Update>> {
        let tables = self.tables.lock();
        let mut updates: Vec<_> = tables
            .updates
            .iter()
            .filter(|update| update.event_id == event_id)
            .cloned()
            .collect();
        // Stable, so rows written in one batch keep their order.
        updates.sort_by_key(|update| update.created_at);
        Ok(updates)
    }

    async fn rsvp_status(&self, user_id: Uuid, event_id: Uuid) -> Result<Option<RsvpStatus>> {
        let tables = self.tables.lock();
        Ok(tables
            .rsvps
            .iter()
            .find(|rsvp| rsvp.user_id == user_id && rsvp.event_id == event_id)
            .map(|rsvp| rsvp.status))
    }

    async fn upsert_rsvp(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        status: RsvpStatus,
    ) -> Result<Rsvp> {
        let mut tables = self.tables.lock();
        if let Some(rsvp) = tables
            .rsvps
            .iter_mut()
            .find(|rsvp| rsvp.user_id == user_id && rsvp.event_id == event_id)
        {
            rsvp.status = status;
            return Ok(rsvp.clone());
        }

        let rsvp = Rsvp {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            status,
            created_at: Utc::now(),
        };
        tables.rsvps.push(rsvp.clone());
        Ok(rsvp)
    }

    async fn delete_rsvp(&self, user_id: Uuid, event_id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock();
        tables
            .rsvps
            .retain(|rsvp| !(rsvp.user_id == user_id && rsvp.event_id == event_id));
        Ok(())
    }

    async fn is_saved(&self, user_id: Uuid, event_id: Uuid) -> Result<bool> {
        let tables = self.tables.lock();
        Ok(tables.saves.contains(&(user_id, event_id)))
    }

    async fn toggle_save(&self, user_id: Uuid, event_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock();
        let key = (user_id, event_id);
        if let Some(index) = tables.saves.iter().position(|row| *row == key) {
            tables.saves.remove(index);
            Ok(false)
        } else {
            tables.saves.push(key);
            Ok(true)
        }
    }

    async fn rsvped_events(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<RsvpedEvent>> {
        let tables = self.tables.lock();
        let mut events: Vec<_> = tables
            .rsvps
            .iter()
            .filter(|rsvp| rsvp.user_id == user_id && rsvp.status != RsvpStatus::No)
            .filter_map(|rsvp| {
                tables
                    .events
                    .iter()
                    .find(|event| event.id == rsvp.event_id && event.starts_at >= since)
                    .map(|event| RsvpedEvent {
                        event: event.clone(),
                        rsvp_status: rsvp.status,
                    })
            })
            .collect();
        events.sort_by_key(|rsvped| rsvped.event.starts_at);
        Ok(events)
    }

    async fn saved_events(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Event>> {
        let tables = self.tables.lock();
        let mut events: Vec<_> = tables
            .events
            .iter()
            .filter(|event| event.starts_at >= since)
            .filter(|event| tables.saves.contains(&(user_id, event.id)))
            .cloned()
            .collect();
        events.sort_by_key(|event| event.starts_at);
        Ok(events)
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        let mut tables = self.tables.lock();
        let message = Message {
            id: new.id,
            event_id: new.event_id,
            entity_id: new.entity_id,
            from_user_id: new.from_user_id,
            message: new.message,
            read: false,
            created_at: Utc::now(),
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn messages_for_entities(&self, entity_ids: &[Uuid]) -> Result<Vec<Message>> {
        let tables = self.tables.lock();
        // Insertion order reversed first, so equal timestamps stay newest first.
        let mut messages: Vec<_> = tables
            .messages
            .iter()
            .rev()
            .filter(|message| entity_ids.contains(&message.entity_id))
            .cloned()
            .collect();
        messages.sort_by_key(|message| Reverse(message.created_at));
        Ok(messages)
    }

    async fn message_by_id(&self, id: Uuid) -> Result<Message> {
        let tables = self.tables.lock();
        tables
            .messages
            .iter()
            .find(|message| message.id == id)
            .cloned()
            .ok_or(StoreError::NotFound("Message"))
    }

    async fn set_message_read(&self, id: Uuid, read: bool) -> Result<Message> {
        let mut tables = self.tables.lock();
        let message = tables
            .messages
            .iter_mut()
            .find(|message| message.id == id)
            .ok_or(StoreError::NotFound("Message"))?;
        message.read = read;
        Ok(message.clone())
    }
}
