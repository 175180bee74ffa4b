//! Track statistics: distances, elevation, speeds and time buckets for charts.

mod buckets;
mod geo;
mod sample;
mod stats;

pub use buckets::{bucketize, bucketize_tracks, data_window};
pub use geo::{bounds, haversine_km, segment_distances, EARTH_RADIUS_KM};
pub use sample::{downsample, sample_by_time};
pub use stats::{compute_stats, compute_stats_with, StatsOptions};

use model::*;
use serde_json::{json, Value};

/// Cumulative distance against elevation, skipping points without elevation.
pub fn elevation_profile(points: &[GeoPoint]) -> Value {
    let mut rows = Vec::with_capacity(points.len());
    let mut d = 0.0_f64;
    for (p, step) in points.iter().zip(segment_distances(points)) {
        d += step;
        if let Some(e) = p.elevation {
            rows.push(json!({
                "distance_km": d,
                "elevation": e
            }));
        }
    }
    Value::Array(rows)
}

pub fn tracks_summary(tracks: &[Track]) -> Value {
    let stats: Vec<TrackStats> = tracks.iter().map(|t| compute_stats(&t.points)).collect();

    let total_km = stats.iter().map(|s| s.total_distance_km).sum::<f64>();
    let longest = stats
        .iter()
        .map(|s| s.total_distance_km)
        .fold(0.0_f64, f64::max);
    let avg = if !stats.is_empty() {
        total_km / (stats.len() as f64)
    } else {
        0.0
    };
    let ascent = stats.iter().map(|s| s.total_ascent).sum::<f64>();
    let duration_ms = stats.iter().filter_map(|s| s.duration_ms).sum::<i64>();

    json!({
        "rides": stats.len(),
        "total_km": total_km,
        "average_km": avg,
        "longest_km": longest,
        "total_ascent": ascent,
        "total_duration_ms": duration_ms
    })
}
