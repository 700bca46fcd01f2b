//! The signed-in user's own profile and calendar.

use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Actor;
use crate::models::{Entity, Event, RsvpedEvent, User};
use crate::state::AppState;
use crate::store::StoreError;
use crate::utils::error::AppError;
use crate::utils::extract::Json;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, deserialize_with = "crate::models::nullable")]
    pub username: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    /// Entities this user administers, by name.
    pub entities: Vec<Entity>,
}

#[derive(Debug, Serialize)]
pub struct Calendar {
    pub rsvp_events: Vec<RsvpedEvent>,
    pub saved_events: Vec<Event>,
}

/// Blank and `null` both clear the username.
fn normalize_username(raw: Option<String>) -> Option<String> {
    raw.map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

pub async fn get_profile(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let (user, entities) = tokio::try_join!(
        store.user_by_id(actor.id),
        store.entities_administered_by(actor.id),
    )?;

    Ok(success(Profile { user, entities }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    actor: Actor,
    Json(patch): Json<ProfilePatch>,
) -> Result<Response, AppError> {
    let username = patch
        .username
        .map(normalize_username)
        .ok_or_else(|| AppError::ValidationError("Missing required field: username".to_string()))?;

    let user = state
        .store
        .set_username(actor.id, username.as_deref())
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                AppError::Conflict("This username is already taken".to_string())
            }
            other => other.into(),
        })?;

    info!(user_id = %user.id, "Profile updated");

    Ok(success(user))
}

/// Upcoming events the user answered `yes` or `maybe` to, and upcoming
/// saved events, each soonest first.
pub async fn get_calendar(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let now = Utc::now();
    let (rsvp_events, saved_events) = tokio::try_join!(
        store.rsvped_events(actor.id, now),
        store.saved_events(actor.id, now),
    )?;

    Ok(success(Calendar {
        rsvp_events,
        saved_events,
    }))
}
