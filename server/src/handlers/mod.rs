use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod contact;
pub mod entities;
pub mod events;
pub mod inbox;
pub mod me;
pub mod params;
pub mod rsvp;
pub mod search;
pub mod updates;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "planit-api",
    };

    success(payload)
}
