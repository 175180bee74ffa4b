use model::{GeoPoint, TrackStats};
use serde::{Deserialize, Serialize};

use crate::geo::haversine_km;

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatsOptions {
    /// Segments slower than this do not count as moving time.
    pub stationary_speed_kmh: f64,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self { stationary_speed_kmh: 1.0 }
    }
}

pub fn compute_stats(points: &[GeoPoint]) -> TrackStats {
    compute_stats_with(points, &StatsOptions::default())
}

/// Aggregate distance, elevation, timing and speed figures for one track.
///
/// Points are taken in recorded order. A pair missing elevation or time only
/// drops out of the aggregates that need it.
pub fn compute_stats_with(points: &[GeoPoint], opts: &StatsOptions) -> TrackStats {
    let (min_elevation, max_elevation) = elevation_range(points);

    if points.len() < 2 {
        let t = points.first().and_then(|p| p.time);
        return TrackStats {
            min_elevation,
            max_elevation,
            start_time: t,
            end_time: t,
            duration_ms: Some(0),
            moving_duration_ms: Some(0),
            point_count: points.len(),
            ..TrackStats::default()
        };
    }

    let mut total_km = 0.0_f64;
    let mut ascent = 0.0_f64;
    let mut descent = 0.0_f64;
    let mut max_speed: Option<f64> = None;
    let mut timed_pairs = 0usize;
    let mut moving_ms = 0i64;
    let mut moving_km = 0.0_f64;

    for w in points.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        let d = haversine_km(prev, cur);
        total_km += d;

        if let (Some(e0), Some(e1)) = (prev.elevation, cur.elevation) {
            let delta = e1 - e0;
            if delta > 0.0 {
                ascent += delta;
            } else {
                descent += -delta;
            }
        }

        if let (Some(t0), Some(t1)) = (prev.time, cur.time) {
            timed_pairs += 1;
            let dt_ms = (t1 - t0).whole_milliseconds() as i64;
            if dt_ms > 0 {
                let speed = d / (dt_ms as f64 / MS_PER_HOUR);
                max_speed = Some(max_speed.map_or(speed, |m| m.max(speed)));
                if speed >= opts.stationary_speed_kmh {
                    moving_ms += dt_ms;
                    moving_km += d;
                }
            }
        }
    }

    let start_time = points.iter().find_map(|p| p.time);
    let end_time = points.iter().rev().find_map(|p| p.time);
    let duration_ms = match (start_time, end_time) {
        (Some(s), Some(e)) => Some(((e - s).whole_milliseconds() as i64).max(0)),
        _ => None,
    };
    let average_speed_kmh = duration_ms
        .filter(|&ms| ms > 0)
        .map(|ms| total_km / (ms as f64 / MS_PER_HOUR));

    let moving_duration_ms = (timed_pairs > 0).then_some(moving_ms);
    let moving_speed_kmh = (moving_ms > 0).then(|| moving_km / (moving_ms as f64 / MS_PER_HOUR));

    TrackStats {
        total_distance_km: total_km,
        total_ascent: ascent,
        total_descent: descent,
        min_elevation,
        max_elevation,
        start_time,
        end_time,
        duration_ms,
        average_speed_kmh,
        max_speed_kmh: max_speed,
        moving_duration_ms,
        moving_speed_kmh,
        point_count: points.len(),
    }
}

fn elevation_range(points: &[GeoPoint]) -> (Option<f64>, Option<f64>) {
    points
        .iter()
        .filter_map(|p| p.elevation)
        .fold((None, None), |(lo, hi): (Option<f64>, Option<f64>), e| {
            (
                Some(lo.map_or(e, |l| l.min(e))),
                Some(hi.map_or(e, |h| h.max(e))),
            )
        })
}
