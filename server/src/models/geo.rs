use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgTypeInfo, PgValueRef};
use sqlx::{Decode, Postgres, Type};
use thiserror::Error;

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Debug, Error, PartialEq)]
pub enum GeoPointError {
    #[error("Point must be written as POINT(<lng> <lat>)")]
    Malformed,

    #[error("Longitude {0} is outside [-180, 180]")]
    Longitude(f64),

    #[error("Latitude {0} is outside [-90, 90]")]
    Latitude(f64),
}

/// A WGS84 point. Travels as WKT text, `POINT(<lng> <lat>)`, both in JSON
/// and to the database.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Result<Self, GeoPointError> {
        if !(-180.0..=180.0).contains(&lng) {
            return Err(GeoPointError::Longitude(lng));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeoPointError::Latitude(lat));
        }
        Ok(Self { lng, lat })
    }

    /// Great-circle distance (haversine).
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POINT({} {})", self.lng, self.lat)
    }
}

impl FromStr for GeoPoint {
    type Err = GeoPointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // EWKT prefix as emitted by PostGIS, e.g. "SRID=4326;POINT(...)"
        let s = match s.split_once(';') {
            Some((srid, rest)) if srid.to_ascii_uppercase().starts_with("SRID=") => rest.trim(),
            _ => s,
        };

        let body = match s.get(..5) {
            Some(head) if head.eq_ignore_ascii_case("point") => &s[5..],
            _ => return Err(GeoPointError::Malformed),
        };

        let inner = body
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or(GeoPointError::Malformed)?;

        let mut coords = inner.split_whitespace();
        let (Some(lng), Some(lat), None) = (coords.next(), coords.next(), coords.next()) else {
            return Err(GeoPointError::Malformed);
        };

        let lng = lng.parse::<f64>().map_err(|_| GeoPointError::Malformed)?;
        let lat = lat.parse::<f64>().map_err(|_| GeoPointError::Malformed)?;

        GeoPoint::new(lng, lat)
    }
}

impl Serialize for GeoPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GeoPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Type<Postgres> for GeoPoint {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for GeoPoint {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let text = <&str as Decode<Postgres>>::decode(value)?;
        Ok(text.parse()?)
    }
}

/// Circle used by the spatial list and search queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoRadius {
    pub center: GeoPoint,
    pub radius_meters: f64,
}

impl GeoRadius {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center.distance_meters(point) <= self.radius_meters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_wkt_point() {
        let point: GeoPoint = "POINT(-73.9857 40.7484)".parse().unwrap();
        assert_eq!(point.lng, -73.9857);
        assert_eq!(point.lat, 40.7484);
    }

    #[test]
    fn test_parses_ewkt_and_lowercase() {
        let point: GeoPoint = "SRID=4326;point( 2.35 48.85 )".parse().unwrap();
        assert_eq!(point, GeoPoint { lng: 2.35, lat: 48.85 });
    }

    #[test]
    fn test_rejects_malformed_points() {
        assert_eq!("POINT(1)".parse::<GeoPoint>(), Err(GeoPointError::Malformed));
        assert_eq!("POINT(1 2 3)".parse::<GeoPoint>(), Err(GeoPointError::Malformed));
        assert_eq!("1 2".parse::<GeoPoint>(), Err(GeoPointError::Malformed));
        assert_eq!(
            "POINT(200 10)".parse::<GeoPoint>(),
            Err(GeoPointError::Longitude(200.0))
        );
        assert_eq!(
            "POINT(10 -91)".parse::<GeoPoint>(),
            Err(GeoPointError::Latitude(-91.0))
        );
    }

    #[test]
    fn test_display_matches_wkt() {
        let point = GeoPoint::new(-122.4194, 37.7749).unwrap();
        assert_eq!(point.to_string(), "POINT(-122.4194 37.7749)");
    }

    #[test]
    fn test_json_uses_text_notation() {
        let point = GeoPoint::new(13.405, 52.52).unwrap();
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, "\"POINT(13.405 52.52)\"");

        let back: GeoPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn test_radius_contains() {
        // Times Square to Empire State Building is roughly 1.1 km
        let times_square = GeoPoint::new(-73.9855, 40.7580).unwrap();
        let empire_state = GeoPoint::new(-73.9857, 40.7484).unwrap();

        let near = GeoRadius {
            center: times_square,
            radius_meters: 2_000.0,
        };
        let tight = GeoRadius {
            center: times_square,
            radius_meters: 500.0,
        };

        assert!(near.contains(&empire_state));
        assert!(!tight.contains(&empire_state));
    }
}
