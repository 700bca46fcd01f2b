use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Error as SqlxError, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{EntityQuery, EventQuery, EventWindow, Result, Store, StoreError};
use crate::models::{
    Entity, EntityPatch, Event, EventHost, EventHostDetail, EventPatch, GeoRadius, Message,
    NewEntity, NewEvent, NewMessage, NewUpdate, Rsvp, RsvpStatus, RsvpedEvent, Update, User,
    UserSummary,
};

const ENTITY_COLUMNS: &str = "id, type, name, slug, description, address, \
     ST_AsText(location::geometry) AS location, banner_url, admin_id, created_at";

const EVENT_COLUMNS: &str = "id, title, slug, description, address, \
     ST_AsText(location::geometry) AS location, starts_at, ends_at, tags, banner_url, \
     created_by, created_at";

const UPDATE_COLUMNS: &str =
    "id, event_id, type, field_changed, old_value, new_value, message, author_id, created_at";

/// Batches share `created_at`, so the insertion sequence breaks ties.
const UPDATE_ORDER: &str = "created_at ASC, seq ASC";

const USER_COLUMNS: &str = "id, email, username, created_at";

const MESSAGE_COLUMNS: &str = "id, event_id, entity_id, from_user_id, message, read, created_at";

/// Helper trait to reduce boilerplate when mapping sqlx errors.
trait IntoStoreError {
    fn not_found_or(self, resource: &'static str) -> StoreError;
    fn conflict_or(self, conflict: &str) -> StoreError;
    fn any(self) -> StoreError;
}

impl IntoStoreError for SqlxError {
    fn not_found_or(self, resource: &'static str) -> StoreError {
        match self {
            SqlxError::RowNotFound => StoreError::NotFound(resource),
            e => e.any(),
        }
    }

    fn conflict_or(self, conflict: &str) -> StoreError {
        match &self {
            SqlxError::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(conflict.to_string())
            }
            _ => self.any(),
        }
    }

    fn any(self) -> StoreError {
        match self {
            SqlxError::Database(db) => StoreError::Backend(db.message().to_string()),
            e => StoreError::Backend(e.to_string()),
        }
    }
}

/// `%` and `_` in user input match literally.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn like_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

/// Postgres + PostGIS implementation backed by a connection pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn entity_by_id(&self, id: Uuid) -> Result<Entity> {
        sqlx::query_as::<_, Entity>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("Entity"))
    }

    async fn event_by_id(&self, id: Uuid) -> Result<Event> {
        sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("Event"))
    }

    /// Serializes toggles of one (user, target) pair until the transaction
    /// ends.
    async fn lock_pair(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        scope: &str,
        user_id: Uuid,
        target_id: Uuid,
    ) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{scope}:{user_id}:{target_id}"))
            .execute(&mut **tx)
            .await
            .map_err(|e| e.any())?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ensure_user(&self, id: Uuid, email: &str) -> Result<()> {
        sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
            .bind(id)
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;
        Ok(())
    }

    async fn user_summary(&self, id: Uuid) -> Result<Option<UserSummary>> {
        sqlx::query_as::<_, UserSummary>("SELECT id, username FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn user_by_id(&self, id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("User"))
    }

    async fn set_username(&self, id: Uuid, username: Option<&str>) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET username = $1 WHERE id = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            SqlxError::RowNotFound => StoreError::NotFound("User"),
            e => e.conflict_or("username already exists"),
        })
    }

    async fn list_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE true"
        ));

        if let Some(kind) = query.kind {
            builder.push(" AND type = ").push_bind(kind);
        }
        if let Some(name) = &query.name {
            builder.push(" AND name ILIKE ").push_bind(like_pattern(name));
        }
        if let Some(term) = &query.term {
            let pattern = like_pattern(term);
            builder
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        builder
            .push(" ORDER BY name ASC LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);

        builder
            .build_query_as::<Entity>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn entities_within_radius(
        &self,
        query: &EntityQuery,
        area: GeoRadius,
    ) -> Result<Vec<Entity>> {
        // The function has no name-only mode; the list endpoint never
        // combines it with a radius.
        let term = query.term.as_deref().or(query.name.as_deref()).map(escape_like);

        sqlx::query_as::<_, Entity>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities_within_radius($1, $2, $3, $4, $5, $6)"
        ))
        .bind(term)
        .bind(area.center.lat)
        .bind(area.center.lng)
        .bind(area.radius_meters)
        .bind(query.kind)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn entity_by_slug(&self, slug: &str) -> Result<Entity> {
        sqlx::query_as::<_, Entity>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("Entity"))
    }

    async fn entities_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Entity>> {
        sqlx::query_as::<_, Entity>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn entities_administered_by(&self, user_id: Uuid) -> Result<Vec<Entity>> {
        sqlx::query_as::<_, Entity>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE admin_id = $1 ORDER BY name ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_entity(&self, new: NewEntity) -> Result<Entity> {
        sqlx::query_as::<_, Entity>(&format!(
            "INSERT INTO entities \
                (id, type, name, slug, description, address, location, banner_url, admin_id) \
             VALUES ($1, $2, $3, $4, $5, $6, ST_GeogFromText($7), $8, $9) \
             RETURNING {ENTITY_COLUMNS}"
        ))
        .bind(new.id)
        .bind(new.kind)
        .bind(&new.name)
        .bind(&new.slug)
        .bind(&new.description)
        .bind(&new.address)
        .bind(new.location.map(|point| point.to_string()))
        .bind(&new.banner_url)
        .bind(new.admin_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.conflict_or(&format!("entity slug '{}' already exists", new.slug)))
    }

    async fn update_entity(&self, id: Uuid, patch: &EntityPatch) -> Result<Entity> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE entities SET ");
        let mut assignments = 0;
        {
            let mut set = builder.separated(", ");
            if let Some(name) = &patch.name {
                set.push("name = ").push_bind_unseparated(name.clone());
                assignments += 1;
            }
            if let Some(description) = &patch.description {
                set.push("description = ")
                    .push_bind_unseparated(description.clone());
                assignments += 1;
            }
            if let Some(address) = &patch.address {
                set.push("address = ").push_bind_unseparated(address.clone());
                assignments += 1;
            }
            if let Some(location) = patch.location {
                set.push("location = ST_GeogFromText(")
                    .push_bind_unseparated(location.map(|point| point.to_string()))
                    .push_unseparated(")");
                assignments += 1;
            }
            if let Some(banner_url) = &patch.banner_url {
                set.push("banner_url = ")
                    .push_bind_unseparated(banner_url.clone());
                assignments += 1;
            }
        }

        if assignments == 0 {
            return self.entity_by_id(id).await;
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {ENTITY_COLUMNS}"));

        builder
            .build_query_as::<Entity>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("Entity"))
    }

    async fn follower_count(&self, entity_id: Uuid) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE entity_id = $1")
            .bind(entity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn is_following(&self, user_id: Uuid, entity_id: Uuid) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND entity_id = $2)",
        )
        .bind(user_id)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn toggle_follow(&self, user_id: Uuid, entity_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;
        Self::lock_pair(&mut tx, "follow", user_id, entity_id).await?;

        let removed = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND entity_id = $2")
            .bind(user_id)
            .bind(entity_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?
            .rows_affected()
            > 0;

        if !removed {
            sqlx::query("INSERT INTO follows (user_id, entity_id) VALUES ($1, $2)")
                .bind(user_id)
                .bind(entity_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())?;
        Ok(!removed)
    }

    async fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE starts_at >= "
        ));
        builder.push_bind(query.starts_from);

        if let Some(until) = query.starts_until {
            builder.push(" AND starts_at <= ").push_bind(until);
        }
        if !query.tags.is_empty() {
            builder.push(" AND tags && ").push_bind(query.tags.clone());
        }
        if let Some(term) = &query.term {
            let pattern = like_pattern(term);
            builder
                .push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        builder
            .push(" ORDER BY starts_at ASC LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);

        builder
            .build_query_as::<Event>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn events_within_radius(
        &self,
        query: &EventQuery,
        area: GeoRadius,
    ) -> Result<Vec<Event>> {
        let tags = (!query.tags.is_empty()).then(|| query.tags.clone());

        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events_within_radius($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(query.term.as_deref().map(escape_like))
        .bind(area.center.lat)
        .bind(area.center.lng)
        .bind(area.radius_meters)
        .bind(query.starts_from)
        .bind(query.starts_until)
        .bind(tags)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn events_hosted_by(
        &self,
        entity_id: Uuid,
        window: EventWindow,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Event>> {
        let (comparison, order) = match window {
            EventWindow::Upcoming => (">=", "ASC"),
            EventWindow::Past => ("<", "DESC"),
        };

        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE id IN (SELECT event_id FROM event_hosts WHERE entity_id = $1) \
               AND starts_at {comparison} $2 \
             ORDER BY starts_at {order} \
             LIMIT $3"
        ))
        .bind(entity_id)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn event_by_slug(&self, slug: &str) -> Result<Event> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("Event"))
    }

    async fn event_hosts(&self, event_ids: &[Uuid]) -> Result<Vec<EventHostDetail>> {
        sqlx::query_as::<_, EventHostDetail>(
            "SELECT h.event_id, h.entity_id, h.can_edit, \
                    en.type, en.name, en.slug, en.banner_url, en.admin_id \
             FROM event_hosts h \
             JOIN entities en ON en.id = h.entity_id \
             WHERE h.event_id = ANY($1) \
             ORDER BY h.event_id, h.position ASC",
        )
        .bind(event_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_event(&self, new: NewEvent, hosts: Vec<EventHost>) -> Result<Event> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let event = sqlx::query_as::<_, Event>(&format!(
            "INSERT INTO events \
                (id, title, slug, description, address, location, starts_at, ends_at, tags, \
                 banner_url, created_by) \
             VALUES ($1, $2, $3, $4, $5, ST_GeogFromText($6), $7, $8, $9, $10, $11) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(new.id)
        .bind(&new.title)
        .bind(&new.slug)
        .bind(&new.description)
        .bind(&new.address)
        .bind(new.location.map(|point| point.to_string()))
        .bind(new.starts_at)
        .bind(new.ends_at)
        .bind(&new.tags)
        .bind(&new.banner_url)
        .bind(new.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.conflict_or(&format!("event slug '{}' already exists", new.slug)))?;

        if !hosts.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO event_hosts (event_id, entity_id, can_edit, position) ",
            );
            builder.push_values(hosts.iter().enumerate(), |mut row, (position, host)| {
                row.push_bind(host.event_id)
                    .push_bind(host.entity_id)
                    .push_bind(host.can_edit)
                    .push_bind(position as i32);
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;
        }

        // Dropping the transaction on an error above rolls both inserts back.
        tx.commit().await.map_err(|e| e.any())?;
        Ok(event)
    }

    async fn update_event(&self, id: Uuid, patch: &EventPatch) -> Result<Event> {
        if patch.is_empty() {
            return self.event_by_id(id).await;
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE events SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(title) = &patch.title {
                set.push("title = ").push_bind_unseparated(title.clone());
            }
            if let Some(description) = &patch.description {
                set.push("description = ")
                    .push_bind_unseparated(description.clone());
            }
            if let Some(address) = &patch.address {
                set.push("address = ").push_bind_unseparated(address.clone());
            }
            if let Some(location) = patch.location {
                set.push("location = ST_GeogFromText(")
                    .push_bind_unseparated(location.map(|point| point.to_string()))
                    .push_unseparated(")");
            }
            if let Some(starts_at) = patch.starts_at {
                set.push("starts_at = ").push_bind_unseparated(starts_at);
            }
            if let Some(ends_at) = patch.ends_at {
                set.push("ends_at = ").push_bind_unseparated(ends_at);
            }
            if let Some(tags) = &patch.tags {
                set.push("tags = ").push_bind_unseparated(tags.clone());
            }
            if let Some(banner_url) = &patch.banner_url {
                set.push("banner_url = ")
                    .push_bind_unseparated(banner_url.clone());
            }
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {EVENT_COLUMNS}"));

        builder
            .build_query_as::<Event>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("Event"))
    }

    async fn delete_event(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Event"));
        }
        Ok(())
    }

    async fn append_updates(&self, updates: Vec<NewUpdate>) -> Result<Vec<Update>> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO updates \
                (id, event_id, type, field_changed, old_value, new_value, message, author_id) ",
        );
        builder.push_values(updates, |mut row, update| {
            row.push_bind(update.id)
                .push_bind(update.event_id)
                .push_bind(update.kind)
                .push_bind(update.field_changed)
                .push_bind(update.old_value)
                .push_bind(update.new_value)
                .push_bind(update.message)
                .push_bind(update.author_id);
        });
        builder.push(format!(" RETURNING {UPDATE_COLUMNS}"));

        builder
            .build_query_as::<Update>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn event_updates(&self, event_id: Uuid) -> Result<Vec<Update>> {
        sqlx::query_as::<_, Update>(&format!(
            "SELECT {UPDATE_COLUMNS} FROM updates WHERE event_id = $1 ORDER BY {UPDATE_ORDER}"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn rsvp_status(&self, user_id: Uuid, event_id: Uuid) -> Result<Option<RsvpStatus>> {
        sqlx::query_scalar::<_, RsvpStatus>(
            "SELECT status FROM rsvps WHERE user_id = $1 AND event_id = $2",
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn upsert_rsvp(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        status: RsvpStatus,
    ) -> Result<Rsvp> {
        sqlx::query_as::<_, Rsvp>(
            "INSERT INTO rsvps (id, user_id, event_id, status) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, event_id) DO UPDATE SET status = EXCLUDED.status \
             RETURNING id, user_id, event_id, status, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(event_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn delete_rsvp(&self, user_id: Uuid, event_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM rsvps WHERE user_id = $1 AND event_id = $2")
            .bind(user_id)
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;
        Ok(())
    }

    async fn is_saved(&self, user_id: Uuid, event_id: Uuid) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM saves WHERE user_id = $1 AND event_id = $2)",
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn toggle_save(&self, user_id: Uuid, event_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;
        Self::lock_pair(&mut tx, "save", user_id, event_id).await?;

        let removed = sqlx::query("DELETE FROM saves WHERE user_id = $1 AND event_id = $2")
            .bind(user_id)
            .bind(event_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?
            .rows_affected()
            > 0;

        if !removed {
            sqlx::query("INSERT INTO saves (user_id, event_id) VALUES ($1, $2)")
                .bind(user_id)
                .bind(event_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())?;
        Ok(!removed)
    }

    async fn rsvped_events(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<RsvpedEvent>> {
        // The derived table keeps the event column names unqualified.
        sqlx::query_as::<_, RsvpedEvent>(&format!(
            "SELECT {EVENT_COLUMNS}, rsvp_status FROM ( \
                SELECT e.*, r.status AS rsvp_status FROM events e \
                JOIN rsvps r ON r.event_id = e.id \
                WHERE r.user_id = $1 AND r.status IN ('yes', 'maybe') AND e.starts_at >= $2 \
             ) AS events \
             ORDER BY starts_at ASC"
        ))
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn saved_events(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Event>> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE id IN (SELECT event_id FROM saves WHERE user_id = $1) \
               AND starts_at >= $2 \
             ORDER BY starts_at ASC"
        ))
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        sqlx::query_as::<_, Message>(&format!(
            "INSERT INTO messages (id, event_id, entity_id, from_user_id, message) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(new.id)
        .bind(new.event_id)
        .bind(new.entity_id)
        .bind(new.from_user_id)
        .bind(&new.message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn messages_for_entities(&self, entity_ids: &[Uuid]) -> Result<Vec<Message>> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE entity_id = ANY($1) \
             ORDER BY created_at DESC"
        ))
        .bind(entity_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn message_by_id(&self, id: Uuid) -> Result<Message> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("Message"))
    }

    async fn set_message_read(&self, id: Uuid, read: bool) -> Result<Message> {
        sqlx::query_as::<_, Message>(&format!(
            "UPDATE messages SET read = $1 WHERE id = $2 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(read)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("Message"))
    }
}
