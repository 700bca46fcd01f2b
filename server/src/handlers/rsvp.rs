use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::Actor;
use crate::models::RsvpStatus;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{Json, Path};
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct RsvpRequest {
    /// Absent and `null` mean different things, so the raw value is kept.
    #[serde(default, deserialize_with = "crate::models::nullable")]
    pub status: Option<Option<Value>>,
}

enum RsvpChange {
    Set(RsvpStatus),
    Clear,
}

fn parse_status(status: Option<Option<Value>>) -> Result<RsvpChange, AppError> {
    match status {
        Some(None) => Ok(RsvpChange::Clear),
        Some(Some(Value::String(raw))) => raw.parse().map(RsvpChange::Set).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn invalid() -> AppError {
    AppError::ValidationError("Invalid status. Must be 'yes', 'no', 'maybe', or null".to_string())
}

pub async fn set_rsvp(
    State(state): State<AppState>,
    actor: Actor,
    Path(slug): Path<String>,
    Json(body): Json<RsvpRequest>,
) -> Result<Response, AppError> {
    let change = parse_status(body.status)?;
    let store = state.store.as_ref();
    let event = store.event_by_slug(&slug).await?;

    match change {
        RsvpChange::Clear => {
            store.delete_rsvp(actor.id, event.id).await?;
            info!(event_id = %event.id, user_id = %actor.id, "RSVP cleared");
            Ok(success(json!({ "status": null })))
        }
        RsvpChange::Set(status) => {
            let rsvp = store.upsert_rsvp(actor.id, event.id, status).await?;
            info!(event_id = %event.id, user_id = %actor.id, status = ?status, "RSVP set");
            Ok(success(rsvp))
        }
    }
}

pub async fn toggle_save(
    State(state): State<AppState>,
    actor: Actor,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let event = store.event_by_slug(&slug).await?;
    let saved = store.toggle_save(actor.id, event.id).await?;

    info!(event_id = %event.id, user_id = %actor.id, saved, "Save toggled");

    Ok(success(json!({ "saved": saved })))
}
