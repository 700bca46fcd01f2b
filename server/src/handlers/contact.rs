use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::Actor;
use crate::handlers::events::event_with_hosts;
use crate::models::{EventHostDetail, NewMessage};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{Json, Path};
use crate::utils::response::created;

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub message: Option<String>,
    pub entity_id: Option<Uuid>,
}

/// Picks the addressed host, or the first host when none is named.
fn recipient(hosts: &[EventHostDetail], entity_id: Option<Uuid>) -> Result<Uuid, AppError> {
    match entity_id {
        Some(entity_id) => hosts
            .iter()
            .find(|host| host.entity_id == entity_id)
            .map(|host| host.entity_id)
            .ok_or_else(|| {
                AppError::ValidationError(
                    "The specified entity is not a host of this event".to_string(),
                )
            }),
        None => hosts.first().map(|host| host.entity_id).ok_or_else(|| {
            AppError::ValidationError("No host entities found for this event".to_string())
        }),
    }
}

pub async fn contact_hosts(
    State(state): State<AppState>,
    actor: Actor,
    Path(slug): Path<String>,
    Json(body): Json<ContactRequest>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let (event, hosts) = event_with_hosts(store, &slug).await?;

    let message = body
        .message
        .as_deref()
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .ok_or_else(|| AppError::ValidationError("Message is required".to_string()))?
        .to_string();
    let entity_id = recipient(&hosts, body.entity_id)?;

    let stored = store
        .create_message(NewMessage {
            id: Uuid::new_v4(),
            event_id: Some(event.id),
            entity_id,
            from_user_id: actor.id,
            message,
        })
        .await?;

    info!(
        message_id = %stored.id,
        event_id = %event.id,
        entity_id = %entity_id,
        "Contact message sent"
    );

    Ok(created(stored))
}
