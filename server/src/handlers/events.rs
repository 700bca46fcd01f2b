use std::collections::HashMap;

use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::Actor;
use crate::handlers::params::{
    page_offset, page_size, parse_optional_datetime, parse_radius, parse_tags,
};
use crate::models::{
    Event, EventHost, EventHostDetail, EventPatch, GeoPoint, GeoRadius, NewEvent, RsvpStatus,
    Update, UserSummary,
};
use crate::state::AppState;
use crate::store::{EventQuery, Store, StoreError};
use crate::utils::error::AppError;
use crate::utils::extract::{Json, Path, Query};
use crate::utils::response::{created, success};
use crate::utils::slug::unique_slug;

const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Serialize)]
pub struct EventWithHosts {
    #[serde(flatten)]
    pub event: Event,
    pub hosts: Vec<EventHostDetail>,
}

#[derive(Debug, Serialize)]
pub struct UserStatus {
    pub rsvp: Option<RsvpStatus>,
    pub saved: bool,
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub hosts: Vec<EventHostDetail>,
    pub updates: Vec<Update>,
    pub created_by_user: Option<UserSummary>,
    pub user_status: Option<UserStatus>,
}

#[derive(Debug, Deserialize)]
pub struct EventListParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub tags: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub radius: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub tags: Option<Vec<String>>,
    pub banner_url: Option<String>,
    pub host_entity_ids: Option<Vec<Uuid>>,
}

/// Runs the spatial query when an area is given. A failing spatial call
/// degrades to the plain filtered list.
pub(crate) async fn find_events(
    store: &dyn Store,
    query: &EventQuery,
    area: Option<GeoRadius>,
) -> Result<Vec<Event>, AppError> {
    if let Some(area) = area {
        match store.events_within_radius(query, area).await {
            Ok(events) => return Ok(events),
            Err(e) => warn!(error = %e, "Spatial event search failed, ignoring radius"),
        }
    }

    Ok(store.list_events(query).await?)
}

pub(crate) async fn with_hosts(
    store: &dyn Store,
    events: Vec<Event>,
) -> Result<Vec<EventWithHosts>, AppError> {
    let ids: Vec<Uuid> = events.iter().map(|event| event.id).collect();
    let mut hosts_by_event: HashMap<Uuid, Vec<EventHostDetail>> = HashMap::new();
    for host in store.event_hosts(&ids).await? {
        hosts_by_event.entry(host.event_id).or_default().push(host);
    }

    Ok(events
        .into_iter()
        .map(|event| {
            let hosts = hosts_by_event.remove(&event.id).unwrap_or_default();
            EventWithHosts { event, hosts }
        })
        .collect())
}

pub(crate) async fn event_with_hosts(
    store: &dyn Store,
    slug: &str,
) -> Result<(Event, Vec<EventHostDetail>), AppError> {
    let event = store.event_by_slug(slug).await?;
    let hosts = store.event_hosts(&[event.id]).await?;
    Ok((event, hosts))
}

fn check_time_range(
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    if ends_at.is_some_and(|ends_at| ends_at < starts_at) {
        return Err(AppError::ValidationError(
            "ends_at must not be before starts_at".to_string(),
        ));
    }
    Ok(())
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventListParams>,
) -> Result<Response, AppError> {
    let query = EventQuery {
        term: None,
        starts_from: parse_optional_datetime("start_date", params.start_date.as_deref())?
            .unwrap_or_else(Utc::now),
        starts_until: parse_optional_datetime("end_date", params.end_date.as_deref())?,
        tags: parse_tags(params.tags.as_deref()),
        limit: page_size(params.limit, DEFAULT_LIMIT),
        offset: page_offset(params.offset),
    };
    let area = parse_radius(
        params.lat.as_deref(),
        params.lng.as_deref(),
        params.radius.as_deref(),
    )?;

    let store = state.store.as_ref();
    let events = find_events(store, &query, area).await?;

    Ok(success(with_hosts(store, events).await?))
}

pub async fn create_event(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<CreateEventRequest>,
) -> Result<Response, AppError> {
    let title = body
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty());
    let (title, starts_at) = match (title, body.starts_at) {
        (Some(title), Some(starts_at)) => (title.to_string(), starts_at),
        _ => {
            return Err(AppError::ValidationError(
                "Missing required fields: title, starts_at".to_string(),
            ))
        }
    };

    let mut host_ids: Vec<Uuid> = Vec::new();
    for id in body.host_entity_ids.unwrap_or_default() {
        if !host_ids.contains(&id) {
            host_ids.push(id);
        }
    }
    if host_ids.is_empty() {
        return Err(AppError::ValidationError(
            "At least one host entity is required".to_string(),
        ));
    }
    check_time_range(starts_at, body.ends_at)?;

    let store = state.store.as_ref();
    let entities = store.entities_by_ids(&host_ids).await?;
    if let Some(missing) = host_ids
        .iter()
        .find(|id| !entities.iter().any(|entity| entity.id == **id))
    {
        return Err(AppError::ValidationError(format!(
            "Host entity {} does not exist",
            missing
        )));
    }

    let owned: Vec<Uuid> = entities
        .iter()
        .filter(|entity| entity.admin_id == actor.id)
        .map(|entity| entity.id)
        .collect();
    if owned.is_empty() {
        return Err(AppError::Forbidden(
            "You must own at least one of the host entities".to_string(),
        ));
    }

    let event_id = Uuid::new_v4();
    let hosts = host_ids
        .iter()
        .map(|&entity_id| EventHost {
            event_id,
            entity_id,
            can_edit: owned.contains(&entity_id),
        })
        .collect();

    let new_event = NewEvent {
        id: event_id,
        slug: unique_slug(&title),
        title,
        description: body.description,
        address: body.address,
        location: body.location,
        starts_at,
        ends_at: body.ends_at,
        tags: body.tags.unwrap_or_default(),
        banner_url: body.banner_url,
        created_by: actor.id,
    };

    let event = store
        .create_event(new_event, hosts)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                AppError::Conflict("An event with this slug already exists".to_string())
            }
            other => other.into(),
        })?;

    info!(
        event_id = %event.id,
        slug = %event.slug,
        user_id = %actor.id,
        hosts = host_ids.len(),
        "Event created"
    );

    let hosts = store.event_hosts(&[event.id]).await?;
    Ok(created(EventWithHosts { event, hosts }))
}

pub async fn get_event(
    State(state): State<AppState>,
    actor: Option<Actor>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let event = store.event_by_slug(&slug).await?;

    let ids = [event.id];
    let (hosts, updates, created_by_user) = tokio::try_join!(
        store.event_hosts(&ids),
        store.event_updates(event.id),
        store.user_summary(event.created_by),
    )?;

    let user_status = match actor {
        Some(actor) => {
            let (rsvp, saved) = tokio::try_join!(
                store.rsvp_status(actor.id, event.id),
                store.is_saved(actor.id, event.id),
            )?;
            Some(UserStatus { rsvp, saved })
        }
        None => None,
    };

    Ok(success(EventDetail {
        event,
        hosts,
        updates,
        created_by_user,
        user_status,
    }))
}

pub async fn update_event(
    State(state): State<AppState>,
    actor: Actor,
    Path(slug): Path<String>,
    Json(mut patch): Json<EventPatch>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let (event, hosts) = event_with_hosts(store, &slug).await?;
    if !event.editable_by(actor.id, &hosts) {
        return Err(AppError::Forbidden(
            "You don't have permission to edit this event".to_string(),
        ));
    }

    if let Some(title) = patch.title.as_mut() {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(AppError::ValidationError("Title cannot be empty".to_string()));
        }
        *title = trimmed.to_string();
    }

    let mut preview = event.clone();
    patch.apply(&mut preview);
    check_time_range(preview.starts_at, preview.ends_at)?;

    let changes = patch.tracked_changes(&event);
    let updated = store.update_event(event.id, &patch).await?;

    if !changes.is_empty() {
        let rows = changes
            .into_iter()
            .map(|change| change.into_update(event.id, actor.id))
            .collect();
        if let Err(e) = store.append_updates(rows).await {
            error!(event_id = %event.id, error = %e, "Failed to record changelog");
        }
    }

    info!(event_id = %updated.id, user_id = %actor.id, "Event updated");

    Ok(success(updated))
}

pub async fn delete_event(
    State(state): State<AppState>,
    actor: Actor,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let (event, hosts) = event_with_hosts(store, &slug).await?;
    if !event.editable_by(actor.id, &hosts) {
        return Err(AppError::Forbidden(
            "You don't have permission to delete this event".to_string(),
        ));
    }

    store.delete_event(event.id).await?;
    info!(event_id = %event.id, user_id = %actor.id, "Event deleted");

    Ok(success(json!({ "success": true })))
}
