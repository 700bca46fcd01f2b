use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{contact, entities, events, health_check, inbox, me, rsvp, search, updates};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let api = Router::new()
        .route(
            "/entities",
            get(entities::list_entities).post(entities::create_entity),
        )
        .route(
            "/entities/:slug",
            get(entities::get_entity).patch(entities::update_entity),
        )
        .route("/entities/:slug/follow", post(entities::toggle_follow))
        .route("/events", get(events::list_events).post(events::create_event))
        .route(
            "/events/:slug",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:slug/rsvp", post(rsvp::set_rsvp))
        .route("/events/:slug/save", post(rsvp::toggle_save))
        .route("/events/:slug/contact", post(contact::contact_hosts))
        .route("/events/:slug/updates", post(updates::post_update))
        .route("/search", get(search::search))
        .route("/me", get(me::get_profile).patch(me::update_profile))
        .route("/me/calendar", get(me::get_calendar))
        .route("/inbox", get(inbox::list_inbox))
        .route("/messages/:id", patch(inbox::mark_message));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.allowed_origins))
}
