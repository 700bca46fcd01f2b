//! Keyword search across events and entities, with optional tag, date and
//! radius filters.

use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::handlers::events::{find_events, with_hosts, EventWithHosts};
use crate::handlers::params::{
    page_size, parse_optional_datetime, parse_radius, parse_tags,
};
use crate::models::{Entity, EntityType, GeoRadius};
use crate::state::AppState;
use crate::store::{EntityQuery, EventQuery, Store};
use crate::utils::error::AppError;
use crate::utils::extract::Query;
use crate::utils::response::success;

const DEFAULT_LIMIT: i64 = 20;
const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub scope: Option<String>,
    pub entity_type: Option<String>,
    pub tags: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub radius: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    All,
    Events,
    Entities,
}

impl Scope {
    fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
            None => Ok(Scope::All),
            Some("events") => Ok(Scope::Events),
            Some("entities") => Ok(Scope::Entities),
            Some(_) => Err(AppError::ValidationError(
                "type must be 'events' or 'entities'".to_string(),
            )),
        }
    }

    fn events(self) -> bool {
        self != Scope::Entities
    }

    fn entities(self) -> bool {
        self != Scope::Events
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub events: Vec<EventWithHosts>,
    pub entities: Vec<Entity>,
}

#[derive(Debug, Serialize)]
pub struct SearchCounts {
    pub events: usize,
    pub entities: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: SearchResults,
    pub counts: SearchCounts,
}

fn search_term(raw: Option<&str>) -> Result<String, AppError> {
    raw.map(str::trim)
        .filter(|term| term.chars().count() >= MIN_QUERY_LEN)
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::ValidationError("Search query must be at least 2 characters".to_string())
        })
}

async fn find_entities(
    store: &dyn Store,
    query: &EntityQuery,
    area: Option<GeoRadius>,
) -> Result<Vec<Entity>, AppError> {
    if let Some(area) = area {
        match store.entities_within_radius(query, area).await {
            Ok(entities) => return Ok(entities),
            Err(e) => warn!(error = %e, "Spatial entity search failed, ignoring radius"),
        }
    }

    Ok(store.list_entities(query).await?)
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, AppError> {
    let term = search_term(params.q.as_deref())?;
    let scope = Scope::parse(params.scope.as_deref())?;
    let entity_type = params
        .entity_type
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            raw.parse::<EntityType>().map_err(|_| {
                AppError::ValidationError(
                    "entity_type must be 'organization' or 'venue'".to_string(),
                )
            })
        })
        .transpose()?;
    let area = parse_radius(
        params.lat.as_deref(),
        params.lng.as_deref(),
        params.radius.as_deref(),
    )?;
    let limit = page_size(params.limit, DEFAULT_LIMIT);
    let store = state.store.as_ref();

    let events = if scope.events() {
        let query = EventQuery {
            term: Some(term.clone()),
            starts_from: parse_optional_datetime("start_date", params.start_date.as_deref())?
                .unwrap_or_else(Utc::now),
            starts_until: parse_optional_datetime("end_date", params.end_date.as_deref())?,
            tags: parse_tags(params.tags.as_deref()),
            limit,
            offset: 0,
        };
        let events = find_events(store, &query, area).await?;
        with_hosts(store, events).await?
    } else {
        Vec::new()
    };

    let entities = if scope.entities() {
        let query = EntityQuery {
            name: None,
            term: Some(term.clone()),
            kind: entity_type,
            limit,
            offset: 0,
        };
        find_entities(store, &query, area).await?
    } else {
        Vec::new()
    };

    let counts = SearchCounts {
        events: events.len(),
        entities: entities.len(),
        total: events.len() + entities.len(),
    };
    debug!(query = %term, events = counts.events, entities = counts.entities, "Search finished");

    Ok(success(SearchResponse {
        query: term,
        results: SearchResults { events, entities },
        counts,
    }))
}
