use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::Actor;
use crate::handlers::params::{page_offset, page_size};
use crate::models::{Entity, EntityPatch, EntityType, Event, GeoPoint, NewEntity};
use crate::state::AppState;
use crate::store::{EntityQuery, EventWindow, StoreError};
use crate::utils::error::AppError;
use crate::utils::extract::{Json, Path, Query};
use crate::utils::response::{created, success};
use crate::utils::slug::slugify;

const DEFAULT_LIMIT: i64 = 50;
const UPCOMING_LIMIT: i64 = 20;
const PAST_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct EntityListParams {
    #[serde(rename = "type")]
    pub kind: Option<EntityType>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEntityRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub banner_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EntityDetail {
    #[serde(flatten)]
    pub entity: Entity,
    pub upcoming_events: Vec<Event>,
    pub past_events: Vec<Event>,
    pub follower_count: i64,
    pub is_following: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn require_admin(entity: &Entity, actor: &Actor) -> Result<(), AppError> {
    if entity.admin_id != actor.id {
        return Err(AppError::Forbidden(
            "You don't have permission to edit this entity".to_string(),
        ));
    }
    Ok(())
}

pub async fn list_entities(
    State(state): State<AppState>,
    Query(params): Query<EntityListParams>,
) -> Result<Response, AppError> {
    let query = EntityQuery {
        name: non_blank(params.q),
        term: None,
        kind: params.kind,
        limit: page_size(params.limit, DEFAULT_LIMIT),
        offset: page_offset(params.offset),
    };

    Ok(success(state.store.list_entities(&query).await?))
}

pub async fn create_entity(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<CreateEntityRequest>,
) -> Result<Response, AppError> {
    let (name, kind) = match (non_blank(body.name), body.kind) {
        (Some(name), Some(kind)) => (name, kind),
        _ => {
            return Err(AppError::ValidationError(
                "Missing required fields: name, type".to_string(),
            ))
        }
    };
    let kind: EntityType = kind.parse().map_err(|_| {
        AppError::ValidationError("Type must be 'organization' or 'venue'".to_string())
    })?;

    let address = non_blank(body.address);
    if kind == EntityType::Venue && address.is_none() {
        return Err(AppError::ValidationError(
            "Venues require an address".to_string(),
        ));
    }

    let slug = slugify(&name);
    if slug.is_empty() {
        return Err(AppError::ValidationError(
            "Name must contain at least one letter or digit".to_string(),
        ));
    }

    let new_entity = NewEntity {
        id: Uuid::new_v4(),
        kind,
        name,
        slug,
        description: body.description,
        address,
        location: body.location,
        banner_url: body.banner_url,
        admin_id: actor.id,
    };

    let entity = state
        .store
        .create_entity(new_entity)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                AppError::Conflict("An entity with this name already exists".to_string())
            }
            other => other.into(),
        })?;

    info!(
        entity_id = %entity.id,
        slug = %entity.slug,
        kind = %entity.kind,
        user_id = %actor.id,
        "Entity created"
    );

    Ok(created(entity))
}

pub async fn get_entity(
    State(state): State<AppState>,
    actor: Option<Actor>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let entity = store.entity_by_slug(&slug).await?;
    let now = Utc::now();

    let (upcoming_events, past_events, follower_count) = tokio::try_join!(
        store.events_hosted_by(entity.id, EventWindow::Upcoming, now, UPCOMING_LIMIT),
        store.events_hosted_by(entity.id, EventWindow::Past, now, PAST_LIMIT),
        store.follower_count(entity.id),
    )?;

    let is_following = match actor {
        Some(actor) => store.is_following(actor.id, entity.id).await?,
        None => false,
    };

    Ok(success(EntityDetail {
        entity,
        upcoming_events,
        past_events,
        follower_count,
        is_following,
    }))
}

pub async fn update_entity(
    State(state): State<AppState>,
    actor: Actor,
    Path(slug): Path<String>,
    Json(mut patch): Json<EntityPatch>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let entity = store.entity_by_slug(&slug).await?;
    require_admin(&entity, &actor)?;

    if let Some(name) = patch.name.as_mut() {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(AppError::ValidationError("Name cannot be empty".to_string()));
        }
        *name = trimmed.to_string();
    }

    let clears_address = patch.address.as_ref().is_some_and(|address| {
        address
            .as_deref()
            .map_or(true, |address| address.trim().is_empty())
    });
    if entity.kind == EntityType::Venue && clears_address {
        return Err(AppError::ValidationError(
            "Venues require an address".to_string(),
        ));
    }

    let updated = store.update_entity(entity.id, &patch).await?;
    info!(entity_id = %updated.id, user_id = %actor.id, "Entity updated");

    Ok(success(updated))
}

pub async fn toggle_follow(
    State(state): State<AppState>,
    actor: Actor,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let entity = store.entity_by_slug(&slug).await?;
    let following = store.toggle_follow(actor.id, entity.id).await?;

    info!(entity_id = %entity.id, user_id = %actor.id, following, "Follow toggled");

    Ok(success(json!({ "following": following })))
}
