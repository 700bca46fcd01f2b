use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::Actor;
use crate::models::Message;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{Json, Path};
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct MarkMessageRequest {
    pub read: bool,
}

/// Messages sent to any entity the actor administers, newest first.
pub async fn list_inbox(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let entity_ids: Vec<Uuid> = store
        .entities_administered_by(actor.id)
        .await?
        .into_iter()
        .map(|entity| entity.id)
        .collect();

    if entity_ids.is_empty() {
        return Ok(success(Vec::<Message>::new()));
    }

    Ok(success(store.messages_for_entities(&entity_ids).await?))
}

pub async fn mark_message(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(body): Json<MarkMessageRequest>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let message = store.message_by_id(id).await?;

    let ids = [message.entity_id];
    let is_admin = store
        .entities_by_ids(&ids)
        .await?
        .iter()
        .any(|entity| entity.admin_id == actor.id);
    if !is_admin {
        return Err(AppError::Forbidden(
            "You don't have permission to manage this message".to_string(),
        ));
    }

    let updated = store.set_message_read(message.id, body.read).await?;
    info!(message_id = %updated.id, read = updated.read, "Message marked");

    Ok(success(updated))
}
