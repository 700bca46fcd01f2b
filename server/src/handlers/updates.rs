use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use tracing::info;

use crate::auth::Actor;
use crate::handlers::events::event_with_hosts;
use crate::models::NewUpdate;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{Json, Path};
use crate::utils::response::created;

#[derive(Debug, Deserialize)]
pub struct PostUpdateRequest {
    pub message: Option<String>,
}

/// Posts a free-text announcement to the event's changelog.
pub async fn post_update(
    State(state): State<AppState>,
    actor: Actor,
    Path(slug): Path<String>,
    Json(body): Json<PostUpdateRequest>,
) -> Result<Response, AppError> {
    let store = state.store.as_ref();
    let (event, hosts) = event_with_hosts(store, &slug).await?;
    if !event.editable_by(actor.id, &hosts) {
        return Err(AppError::Forbidden(
            "You don't have permission to post updates for this event".to_string(),
        ));
    }

    let message = body
        .message
        .as_deref()
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .ok_or_else(|| AppError::ValidationError("Message is required".to_string()))?;

    let mut rows = store
        .append_updates(vec![NewUpdate::manual(
            event.id,
            actor.id,
            message.to_string(),
        )])
        .await?;
    let update = rows
        .pop()
        .ok_or_else(|| AppError::InternalServerError("Update was not stored".to_string()))?;

    info!(event_id = %event.id, update_id = %update.id, user_id = %actor.id, "Update posted");

    Ok(created(update))
}
