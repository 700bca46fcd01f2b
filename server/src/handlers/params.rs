//! Parsing for the query-string filters shared by the list and search
//! endpoints. Everything arrives as text so the error messages stay ours.

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{GeoPoint, GeoRadius};
use crate::utils::error::AppError;

pub const DEFAULT_RADIUS_METERS: f64 = 10_000.0;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_datetime(field: &str, raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            AppError::ValidationError(format!("{} must be an ISO 8601 date or timestamp", field))
        })
}

pub fn parse_optional_datetime(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, AppError> {
    raw.filter(|value| !value.trim().is_empty())
        .map(|value| parse_datetime(field, value))
        .transpose()
}

/// Comma-separated tag list; blanks are dropped.
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|tags| {
        tags.split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_number(field: &str, raw: &str) -> Result<f64, AppError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| AppError::ValidationError(format!("{} must be a number", field)))
}

/// Builds the search circle when both `lat` and `lng` are given.
pub fn parse_radius(
    lat: Option<&str>,
    lng: Option<&str>,
    radius: Option<&str>,
) -> Result<Option<GeoRadius>, AppError> {
    let (lat, lng) = match (lat, lng) {
        (None, None) => return Ok(None),
        (Some(lat), Some(lng)) => (parse_number("lat", lat)?, parse_number("lng", lng)?),
        _ => {
            return Err(AppError::ValidationError(
                "lat and lng must be provided together".to_string(),
            ))
        }
    };

    let center =
        GeoPoint::new(lng, lat).map_err(|err| AppError::ValidationError(err.to_string()))?;

    let radius_meters = match radius {
        Some(raw) => parse_number("radius", raw)?,
        None => DEFAULT_RADIUS_METERS,
    };
    if radius_meters <= 0.0 {
        return Err(AppError::ValidationError(
            "radius must be greater than zero".to_string(),
        ));
    }

    Ok(Some(GeoRadius {
        center,
        radius_meters,
    }))
}

pub fn page_size(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
}

pub fn page_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}
