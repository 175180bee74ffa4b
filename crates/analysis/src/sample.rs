use model::GeoPoint;
use time::{Duration, OffsetDateTime};

/// Thin a track to at most one point per `interval`.
///
/// Points without a time are skipped. A point is kept when it is at least
/// `interval` after the last kept one, and the final point is kept whenever it
/// has a time. If no point has a time the first and last points are returned.
pub fn sample_by_time(points: &[GeoPoint], interval: Duration) -> Vec<GeoPoint> {
    let mut out = Vec::new();
    let mut last: Option<OffsetDateTime> = None;
    let final_index = points.len().saturating_sub(1);

    for (i, p) in points.iter().enumerate() {
        let Some(ts) = p.time else { continue };
        let due = match last {
            None => true,
            Some(prev) => ts - prev >= interval,
        };
        if due || i == final_index {
            out.push(p.clone());
            last = Some(ts);
        }
    }

    if out.is_empty() {
        if let Some(first) = points.first() {
            out.push(first.clone());
        }
        if points.len() > 1 {
            out.extend(points.last().cloned());
        }
    }
    out
}

/// Keep every n-th point so roughly `max_points` remain, plus the last point.
pub fn downsample(points: &[GeoPoint], max_points: usize) -> Vec<GeoPoint> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let step = points.len().div_ceil(max_points.max(1));
    let mut out: Vec<GeoPoint> = points.iter().step_by(step).cloned().collect();
    if (points.len() - 1) % step != 0 {
        out.extend(points.last().cloned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn timed(secs: &[i64]) -> Vec<GeoPoint> {
        let t0 = datetime!(2024-05-01 08:00 UTC);
        secs.iter()
            .enumerate()
            .map(|(i, s)| GeoPoint::new(51.0, 4.0 + i as f64 * 0.001).with_time(t0 + Duration::seconds(*s)))
            .collect()
    }

    fn offsets(points: &[GeoPoint]) -> Vec<i64> {
        let t0 = datetime!(2024-05-01 08:00 UTC);
        points.iter().map(|p| (p.time.unwrap() - t0).whole_seconds()).collect()
    }

    #[test]
    fn test_one_point_per_interval() {
        let pts = timed(&[0, 10, 20, 30, 40, 50, 60, 65]);
        let out = sample_by_time(&pts, Duration::seconds(30));
        assert_eq!(offsets(&out), vec![0, 30, 60, 65]);
    }

    #[test]
    fn test_last_point_kept() {
        let pts = timed(&[0, 5, 12]);
        let out = sample_by_time(&pts, Duration::seconds(30));
        assert_eq!(offsets(&out), vec![0, 12]);
        assert_eq!(out.last(), pts.last());
    }

    #[test]
    fn test_untimed_points_skipped() {
        let mut pts = timed(&[0, 40, 80]);
        pts.insert(1, GeoPoint::new(51.5, 4.5));
        let out = sample_by_time(&pts, Duration::seconds(30));
        assert_eq!(offsets(&out), vec![0, 40, 80]);
    }

    #[test]
    fn test_no_times_falls_back_to_ends() {
        let pts: Vec<GeoPoint> = (0..5).map(|i| GeoPoint::new(51.0, 4.0 + i as f64)).collect();
        let out = sample_by_time(&pts, Duration::seconds(30));
        assert_eq!(out, vec![pts[0].clone(), pts[4].clone()]);

        let single = vec![GeoPoint::new(51.0, 4.0)];
        assert_eq!(sample_by_time(&single, Duration::seconds(30)), single);
        assert!(sample_by_time(&[], Duration::seconds(30)).is_empty());
    }

    #[test]
    fn test_downsample() {
        let pts: Vec<GeoPoint> = (0..10).map(|i| GeoPoint::new(51.0, i as f64)).collect();
        let lons = |v: Vec<GeoPoint>| v.iter().map(|p| p.lon).collect::<Vec<_>>();

        assert_eq!(lons(downsample(&pts, 4)), vec![0.0, 3.0, 6.0, 9.0]);
        assert_eq!(lons(downsample(&pts, 3)), vec![0.0, 4.0, 8.0, 9.0]);
        assert_eq!(downsample(&pts, 20), pts);
        assert_eq!(lons(downsample(&pts, 0)), vec![0.0, 9.0]);
    }
}
