use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub time: Option<OffsetDateTime>,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, elevation: None, time: None }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_time(mut self, time: OffsetDateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Finite latitude in [-90, 90] and longitude in [-180, 180].
    pub fn has_valid_coords(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrackMeta {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    pub name: String,
    pub source: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Track {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    pub meta: TrackMeta,
    #[serde(default)]
    pub points: Vec<GeoPoint>,
}

impl Track {
    pub fn new(name: &str, source: &str, points: Vec<GeoPoint>) -> Self {
        Self {
            id: Uuid::new_v4(),
            meta: TrackMeta {
                id: Uuid::new_v4(),
                name: name.into(),
                source: source.into(),
            },
            points,
        }
    }
}

/// A named `<wpt>` marker; not part of any track.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Waypoint {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub time: Option<OffsetDateTime>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub sym: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DocumentMeta {
    pub name: Option<String>,
    pub desc: Option<String>,
    pub author: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub time: Option<OffsetDateTime>,
}

/// Everything read from one input file.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Document {
    pub source: String,
    #[serde(default)]
    pub meta: DocumentMeta,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Document {
    pub fn from_tracks(source: &str, tracks: Vec<Track>) -> Self {
        Self {
            source: source.into(),
            meta: DocumentMeta::default(),
            waypoints: Vec::new(),
            tracks,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TrackStats {
    pub total_distance_km: f64,
    pub total_ascent: f64,
    pub total_descent: f64,
    pub min_elevation: Option<f64>,
    pub max_elevation: Option<f64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub duration_ms: Option<i64>,
    pub average_speed_kmh: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub moving_duration_ms: Option<i64>,
    pub moving_speed_kmh: Option<f64>,
    pub point_count: usize,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Month,
    Year,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Bucket {
    pub label: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub total_km: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct BBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_optional_fields_default() {
        let p: GeoPoint = serde_json::from_str(r#"{"lat":51.0,"lon":4.0}"#).unwrap();
        assert_eq!(p, GeoPoint::new(51.0, 4.0));
    }

    #[test]
    fn test_point_time_is_rfc3339() {
        let p: GeoPoint = serde_json::from_str(
            r#"{"lat":51.0,"lon":4.0,"elevation":12.5,"time":"2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(p.elevation, Some(12.5));
        assert_eq!(p.time.map(|t| t.unix_timestamp()), Some(1_709_287_200));
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(GeoPoint::new(90.0, -180.0).has_valid_coords());
        assert!(!GeoPoint::new(90.5, 0.0).has_valid_coords());
        assert!(!GeoPoint::new(0.0, f64::NAN).has_valid_coords());
        assert!(!GeoPoint::new(f64::INFINITY, 0.0).has_valid_coords());
    }

    #[test]
    fn test_document_defaults() {
        let d: Document = serde_json::from_str(r#"{"source":"a.gpx"}"#).unwrap();
        assert_eq!(d, Document::from_tracks("a.gpx", vec![]));
        assert!(d.meta.name.is_none());
    }

    #[test]
    fn test_granularity_names() {
        let g: Granularity = serde_json::from_str("\"month\"").unwrap();
        assert_eq!(g, Granularity::Month);
    }
}
