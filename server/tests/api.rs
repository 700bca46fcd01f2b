use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use planit_server::config::Config;
use planit_server::routes::create_routes;
use planit_server::state::AppState;
use planit_server::store::MemoryStore;

const SECRET: &str = "integration-secret";
const STARTS_AT: &str = "2099-06-01T19:00:00Z";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        let config = Config::from_lookup(|key| match key {
            "AUTH_JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap();
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), &config);

        Self {
            router: create_routes(state, &config),
            store,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token(user)));
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, json)
    }

    async fn get(&self, uri: &str, user: Option<Uuid>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, user, None).await
    }

    async fn post(&self, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(user), Some(body)).await
    }

    async fn patch(&self, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, Some(user), Some(body)).await
    }

    async fn create_entity(&self, user: Uuid, name: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/entities",
                user,
                json!({ "name": name, "type": "organization" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    async fn create_event(&self, user: Uuid, title: &str, hosts: &[&Value]) -> Value {
        let ids: Vec<&Value> = hosts.iter().map(|host| &host["id"]).collect();
        let (status, body) = self
            .post(
                "/api/events",
                user,
                json!({ "title": title, "starts_at": STARTS_AT, "host_entity_ids": ids }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

fn token(user: Uuid) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::default(),
        &json!({ "sub": user, "email": "someone@planit.test", "aud": "authenticated", "exp": exp }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn slug_of(value: &Value) -> &str {
    value["slug"].as_str().unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "service": "planit-api" }));
}

#[tokio::test]
async fn test_protected_routes_require_a_session() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/events",
            None,
            Some(json!({ "title": "Jazz Night" })),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn test_duplicate_entity_name_conflicts() {
    let app = TestApp::new();
    let user = Uuid::new_v4();

    let first = app.create_entity(user, "The Spot").await;
    assert_eq!(slug_of(&first), "the-spot");

    let (status, body) = app
        .post(
            "/api/entities",
            Uuid::new_v4(),
            json!({ "name": "The Spot", "type": "organization" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body,
        json!({ "error": "An entity with this name already exists" })
    );
}

#[tokio::test]
async fn test_entity_validation() {
    let app = TestApp::new();
    let user = Uuid::new_v4();

    let (status, body) = app
        .post("/api/entities", user, json!({ "name": "  " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields: name, type");

    let (status, body) = app
        .post("/api/entities", user, json!({ "name": "Hall", "type": "band" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Type must be 'organization' or 'venue'");

    let (status, _) = app
        .post("/api/entities", user, json!({ "name": "Hall", "type": "venue" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_only_the_admin_edits_an_entity() {
    let app = TestApp::new();
    let admin = Uuid::new_v4();
    let entity = app.create_entity(admin, "Jazz Club").await;
    let uri = format!("/api/entities/{}", slug_of(&entity));

    let (status, body) = app
        .patch(&uri, Uuid::new_v4(), json!({ "description": "hijacked" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "You don't have permission to edit this entity");

    let (status, body) = app
        .patch(
            &uri,
            admin,
            json!({ "description": "Live music", "slug": "ignored" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "Live music");
    assert_eq!(body["slug"], "jazz-club");
}

#[tokio::test]
async fn test_event_creation_requires_an_owned_host() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;

    let (status, body) = app
        .post(
            "/api/events",
            owner,
            json!({ "title": "Jazz Night", "starts_at": STARTS_AT, "host_entity_ids": [] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "At least one host entity is required");

    let (status, body) = app
        .post(
            "/api/events",
            owner,
            json!({ "host_entity_ids": [club["id"]] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields: title, starts_at");

    let (status, body) = app
        .post(
            "/api/events",
            stranger,
            json!({ "title": "Jazz Night", "starts_at": STARTS_AT, "host_entity_ids": [club["id"]] }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "You must own at least one of the host entities");
}

#[tokio::test]
async fn test_co_hosts_without_ownership_cannot_edit() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let partner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let venue = app
        .post(
            "/api/entities",
            partner,
            json!({ "name": "Blue Room", "type": "venue", "address": "1 Main St" }),
        )
        .await
        .1;

    let event = app.create_event(owner, "Jazz Night", &[&club, &venue]).await;
    let hosts = event["hosts"].as_array().unwrap();
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts[0]["can_edit"], true);
    assert_eq!(hosts[1]["can_edit"], false);

    let uri = format!("/api/events/{}", slug_of(&event));
    let (status, body) = app.patch(&uri, partner, json!({ "title": "Taken" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "You don't have permission to edit this event");
}

#[tokio::test]
async fn test_title_change_is_chronicled_once() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "A", &[&club]).await;
    let uri = format!("/api/events/{}", slug_of(&event));

    let (status, body) = app.patch(&uri, owner, json!({ "title": "B" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "B");

    let (status, _) = app.patch(&uri, owner, json!({ "title": "B" })).await;
    assert_eq!(status, StatusCode::OK);

    let (_, detail) = app.get(&uri, None).await;
    let updates = detail["updates"].as_array().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["type"], "auto");
    assert_eq!(updates[0]["field_changed"], "title");
    assert_eq!(updates[0]["old_value"], "A");
    assert_eq!(updates[0]["new_value"], "B");
    assert_eq!(updates[0]["author_id"], json!(owner));
}

#[tokio::test]
async fn test_setting_ends_at_is_not_chronicled() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "Jazz Night", &[&club]).await;
    let uri = format!("/api/events/{}", slug_of(&event));

    let (status, body) = app
        .patch(&uri, owner, json!({ "ends_at": "2099-06-01T23:00:00Z" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ends_at"], "2099-06-01T23:00:00Z");
    assert_eq!(body["title"], "Jazz Night");

    let (_, detail) = app.get(&uri, None).await;
    assert_eq!(detail["updates"], json!([]));
}

#[tokio::test]
async fn test_ends_at_before_starts_at_is_rejected() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "Jazz Night", &[&club]).await;
    let uri = format!("/api/events/{}", slug_of(&event));

    let (status, _) = app
        .patch(&uri, owner, json!({ "ends_at": "2099-05-01T00:00:00Z" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_changelog_failure_keeps_the_update() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "Jazz Night", &[&club]).await;
    let uri = format!("/api/events/{}", slug_of(&event));

    app.store.disable_changelog();
    let (status, body) = app
        .patch(&uri, owner, json!({ "title": "Blues Night" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Blues Night");

    let (_, detail) = app.get(&uri, None).await;
    assert_eq!(detail["title"], "Blues Night");
    assert_eq!(detail["updates"], json!([]));
}

#[tokio::test]
async fn test_manual_updates() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "Jazz Night", &[&club]).await;
    let uri = format!("/api/events/{}/updates", slug_of(&event));

    let (status, body) = app.post(&uri, owner, json!({ "message": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message is required");

    let (status, body) = app
        .post(&uri, Uuid::new_v4(), json!({ "message": "Doors at 7" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "You don't have permission to post updates for this event"
    );

    let (status, body) = app
        .post(&uri, owner, json!({ "message": "  Doors at 7 " }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["type"], "manual");
    assert_eq!(body["message"], "Doors at 7");
}

#[tokio::test]
async fn test_save_toggles_back_and_forth() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let fan = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "Jazz Night", &[&club]).await;
    let uri = format!("/api/events/{}/save", slug_of(&event));

    let (status, body) = app.post(&uri, fan, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "saved": true }));

    let (_, body) = app.post(&uri, fan, json!({})).await;
    assert_eq!(body, json!({ "saved": false }));
}

#[tokio::test]
async fn test_rsvp_upserts_and_clears() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let fan = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "Jazz Night", &[&club]).await;
    let detail_uri = format!("/api/events/{}", slug_of(&event));
    let uri = format!("{}/rsvp", detail_uri);

    let (status, first) = app.post(&uri, fan, json!({ "status": "yes" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "yes");

    let (_, second) = app.post(&uri, fan, json!({ "status": "maybe" })).await;
    assert_eq!(second["status"], "maybe");
    assert_eq!(second["id"], first["id"]);

    let (_, detail) = app.get(&detail_uri, Some(fan)).await;
    assert_eq!(
        detail["user_status"],
        json!({ "rsvp": "maybe", "saved": false })
    );

    let (status, body) = app.post(&uri, fan, json!({ "status": null })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": null }));

    let (_, detail) = app.get(&detail_uri, Some(fan)).await;
    assert_eq!(detail["user_status"]["rsvp"], Value::Null);

    let (status, body) = app.post(&uri, fan, json!({ "status": "going" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Invalid status. Must be 'yes', 'no', 'maybe', or null"
    );
}

#[tokio::test]
async fn test_event_detail_for_anonymous_visitors() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "Jazz Night", &[&club]).await;

    let (status, detail) = app
        .get(&format!("/api/events/{}", slug_of(&event)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["user_status"], Value::Null);
    assert_eq!(detail["created_by_user"]["id"], json!(owner));
    assert_eq!(detail["hosts"][0]["name"], "Jazz Club");
    assert_eq!(detail["hosts"][0]["type"], "organization");

    let (status, body) = app.get("/api/events/no-such-event", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Event not found" }));
}

#[tokio::test]
async fn test_delete_event() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "Jazz Night", &[&club]).await;
    let uri = format!("/api/events/{}", slug_of(&event));

    let (status, _) = app
        .send(Method::DELETE, &uri, Some(Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send(Method::DELETE, &uri, Some(owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_follow_and_entity_detail() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let fan = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    app.create_event(owner, "Jazz Night", &[&club]).await;
    let uri = format!("/api/entities/{}", slug_of(&club));

    let (status, body) = app.post(&format!("{}/follow", uri), fan, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "following": true }));

    let (_, detail) = app.get(&uri, Some(fan)).await;
    assert_eq!(detail["follower_count"], 1);
    assert_eq!(detail["is_following"], true);
    assert_eq!(detail["upcoming_events"].as_array().unwrap().len(), 1);
    assert_eq!(detail["past_events"], json!([]));

    let (_, detail) = app.get(&uri, None).await;
    assert_eq!(detail["is_following"], false);
}

#[tokio::test]
async fn test_search_query_length() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    app.create_event(owner, "Jazz Night", &[&club]).await;

    let (status, body) = app.get("/api/search?q=ja", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "ja");
    assert_eq!(body["counts"], json!({ "events": 1, "entities": 1, "total": 2 }));

    let (status, body) = app.get("/api/search?q=a", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Search query must be at least 2 characters");

    let (status, body) = app.get("/api/search?q=ja&type=entities", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"]["events"], json!([]));
}

#[tokio::test]
async fn test_radius_search_and_fallback() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let (status, _) = app
        .post(
            "/api/events",
            owner,
            json!({
                "title": "Jazz Night",
                "starts_at": STARTS_AT,
                "location": "POINT(-73.98 40.75)",
                "host_entity_ids": [club["id"]],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    app.create_event(owner, "Jazz Brunch", &[&club]).await;

    let uri = "/api/events?lat=40.75&lng=-73.98&radius=1000";
    let (status, body) = app.get(uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let events = body.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["title"], "Jazz Night");

    app.store.disable_spatial();
    let (status, body) = app.get(uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = app.get("/api/events?lat=40.75", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_contact_and_inbox() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let fan = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "Jazz Night", &[&club]).await;
    let uri = format!("/api/events/{}/contact", slug_of(&event));

    let (status, body) = app
        .post(&uri, fan, json!({ "message": "Hi", "entity_id": Uuid::new_v4() }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "The specified entity is not a host of this event");

    let (status, message) = app.post(&uri, fan, json!({ "message": "Is it all ages?" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["entity_id"], club["id"]);
    assert_eq!(message["read"], false);

    let (status, inbox) = app.get("/api/inbox", Some(owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox.as_array().unwrap().len(), 1);

    let message_uri = format!("/api/messages/{}", message["id"].as_str().unwrap());
    let (status, _) = app.patch(&message_uri, fan, json!({ "read": true })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.patch(&message_uri, owner, json!({ "read": true })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["read"], true);

    let (status, _) = app
        .patch(
            &format!("/api/messages/{}", Uuid::new_v4()),
            owner,
            json!({ "read": true }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/entities")
                .header(AUTHORIZATION, format!("Bearer {}", token(Uuid::new_v4())))
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_contact_unknown_event_is_not_found_before_validation() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/events/no-such-event/contact",
            Uuid::new_v4(),
            json!({ "message": "  " }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Event not found" }));
}

#[tokio::test]
async fn test_adding_an_address_is_chronicled() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;
    let event = app.create_event(owner, "Jazz Night", &[&club]).await;
    let uri = format!("/api/events/{}", slug_of(&event));

    let (status, _) = app.patch(&uri, owner, json!({ "address": "1 Main St" })).await;
    assert_eq!(status, StatusCode::OK);

    let (_, detail) = app.get(&uri, None).await;
    let updates = detail["updates"].as_array().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["field_changed"], "address");
    assert_eq!(updates[0]["old_value"], "");
    assert_eq!(updates[0]["new_value"], "1 Main St");
}

async fn post_event(app: &TestApp, owner: Uuid, host: &Value, mut body: Value) -> Value {
    body["host_entity_ids"] = json!([host["id"]]);
    if body.get("starts_at").is_none() {
        body["starts_at"] = json!(STARTS_AT);
    }
    let (status, event) = app.post("/api/events", owner, body).await;
    assert_eq!(status, StatusCode::CREATED, "{}", event);
    event
}

fn event_titles(body: &Value) -> Vec<&str> {
    body["results"]["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["title"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_search_tags_match_any_overlap() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Night Owls").await;
    for body in [
        json!({ "title": "Jazz Night", "tags": ["jazz", "live"] }),
        json!({ "title": "Folk Night", "tags": ["folk"] }),
        json!({ "title": "Quiet Night" }),
    ] {
        post_event(&app, owner, &club, body).await;
    }

    let (status, body) = app.get("/api/search?q=night&tags=live,folk", None).await;
    assert_eq!(status, StatusCode::OK);
    let mut titles = event_titles(&body);
    titles.sort();
    assert_eq!(titles, vec!["Folk Night", "Jazz Night"]);

    let (_, body) = app.get("/api/search?q=night&tags=blues", None).await;
    assert_eq!(body["counts"]["events"], 0);
}

#[tokio::test]
async fn test_search_date_bounds() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Night Owls").await;
    for (title, starts_at) in [
        ("June Night", "2099-06-01T19:00:00Z"),
        ("July Night", "2099-07-01T19:00:00Z"),
        ("August Night", "2099-08-01T19:00:00Z"),
    ] {
        let body = json!({ "title": title, "starts_at": starts_at });
        post_event(&app, owner, &club, body).await;
    }

    let (status, body) = app
        .get(
            "/api/search?q=night&type=events&start_date=2099-06-15&end_date=2099-07-31",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event_titles(&body), vec!["July Night"]);

    let (_, body) = app
        .get("/api/search?q=night&start_date=2099-07-01T19:00:00Z", None)
        .await;
    assert_eq!(event_titles(&body), vec!["July Night", "August Night"]);

    let (status, body) = app.get("/api/search?q=night&end_date=soon", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "end_date must be an ISO 8601 date or timestamp");
}

#[tokio::test]
async fn test_search_matches_event_description() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let club = app.create_entity(owner, "Night Owls").await;
    post_event(
        &app,
        owner,
        &club,
        json!({ "title": "Friday Session", "description": "Standards and SAXOPHONE solos" }),
    )
    .await;
    post_event(&app, owner, &club, json!({ "title": "Saturday Session" })).await;

    let (status, body) = app.get("/api/search?q=saxophone", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event_titles(&body), vec!["Friday Session"]);
    assert_eq!(body["counts"], json!({ "events": 1, "entities": 0, "total": 1 }));
}

#[tokio::test]
async fn test_search_entity_type_filter() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    app.create_entity(owner, "Jazz Collective").await;
    let (status, _) = app
        .post(
            "/api/entities",
            owner,
            json!({ "name": "Jazz Cellar", "type": "venue", "address": "1 Main St" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .get("/api/search?q=jazz&type=entities&entity_type=venue", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let entities = body["results"]["entities"].as_array().unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0]["name"], "Jazz Cellar");

    let (_, body) = app.get("/api/search?q=jazz&type=entities", None).await;
    assert_eq!(body["counts"]["entities"], 2);

    let (status, body) = app.get("/api/search?q=jazz&entity_type=band", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "entity_type must be 'organization' or 'venue'");
}

#[tokio::test]
async fn test_search_radius_falls_back_without_spatial_support() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    for (name, location) in [
        ("Jazz Corner", json!("POINT(-73.98 40.75)")),
        ("Jazz Annex", Value::Null),
    ] {
        let (status, _) = app
            .post(
                "/api/entities",
                owner,
                json!({ "name": name, "type": "organization", "location": location }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let uri = "/api/search?q=jazz&type=entities&lat=40.75&lng=-73.98&radius=500";
    let (status, body) = app.get(uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["entities"], 1);
    assert_eq!(body["results"]["entities"][0]["name"], "Jazz Corner");

    app.store.disable_spatial();
    let (status, body) = app.get(uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["entities"], 2);
}

#[tokio::test]
async fn test_profile_username_and_entities() {
    let app = TestApp::new();
    let ana = Uuid::new_v4();
    let ben = Uuid::new_v4();
    let club = app.create_entity(ana, "Jazz Club").await;
    let event = app.create_event(ana, "Jazz Night", &[&club]).await;

    let (status, profile) = app.get("/api/me", Some(ana)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["id"], json!(ana));
    assert_eq!(profile["username"], Value::Null);
    assert_eq!(profile["entities"][0]["slug"], "jazz-club");

    let (status, user) = app.patch("/api/me", ana, json!({ "username": " ana " })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["username"], "ana");

    let (status, body) = app.patch("/api/me", ben, json!({ "username": "ana" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({ "error": "This username is already taken" }));

    let (_, detail) = app
        .get(&format!("/api/events/{}", slug_of(&event)), None)
        .await;
    assert_eq!(detail["created_by_user"]["username"], "ana");

    let (status, user) = app.patch("/api/me", ana, json!({ "username": "  " })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["username"], Value::Null);

    let (status, _) = app.patch("/api/me", ana, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, profile) = app.get("/api/me", Some(ben)).await;
    assert_eq!(profile["entities"], json!([]));
}

#[tokio::test]
async fn test_calendar_shows_upcoming_rsvps_and_saves() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let fan = Uuid::new_v4();
    let club = app.create_entity(owner, "Jazz Club").await;

    let mut slugs = Vec::new();
    for (title, starts_at) in [
        ("Late Show", "2099-09-01T19:00:00Z"),
        ("Early Show", "2099-06-01T19:00:00Z"),
        ("Skipped Show", "2099-07-01T19:00:00Z"),
    ] {
        let body = json!({ "title": title, "starts_at": starts_at });
        let event = post_event(&app, owner, &club, body).await;
        slugs.push(slug_of(&event).to_string());
    }
    for (slug, status) in slugs.iter().zip(["maybe", "yes", "no"]) {
        let uri = format!("/api/events/{}/rsvp", slug);
        let (code, _) = app.post(&uri, fan, json!({ "status": status })).await;
        assert_eq!(code, StatusCode::OK);
    }
    for slug in [&slugs[0], &slugs[2]] {
        app.post(&format!("/api/events/{}/save", slug), fan, json!({})).await;
    }

    let (status, calendar) = app.get("/api/me/calendar", Some(fan)).await;
    assert_eq!(status, StatusCode::OK);

    let rsvps: Vec<(&str, &str)> = calendar["rsvp_events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["title"].as_str().unwrap(), e["rsvp_status"].as_str().unwrap()))
        .collect();
    assert_eq!(rsvps, vec![("Early Show", "yes"), ("Late Show", "maybe")]);

    let saved: Vec<&str> = calendar["saved_events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["title"].as_str().unwrap())
        .collect();
    assert_eq!(saved, vec!["Skipped Show", "Late Show"]);

    let (status, _) = app.get("/api/me/calendar", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
