use model::{Bucket, GeoPoint, Granularity, Track};
use time::{util, Duration, OffsetDateTime, Time};

use crate::geo::segment_distances;
use crate::stats::compute_stats;

/// Sum each point's segment distance into calendar buckets covering
/// `[window_start, window_end]`.
///
/// Calendar boundaries are computed in the offset of `window_start`. Every
/// bucket is half-open except the last, which includes `window_end`. Empty
/// buckets are kept.
pub fn bucketize(
    points: &[GeoPoint],
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
    granularity: Granularity,
) -> Vec<Bucket> {
    let dists = segment_distances(points);
    let samples = points
        .iter()
        .zip(dists)
        .filter_map(|(p, d)| p.time.map(|t| (t, d)));
    bucketize_samples(samples, window_start, window_end, granularity)
}

/// Like [`bucketize`], but each track contributes its whole distance at its
/// start time.
pub fn bucketize_tracks(
    tracks: &[Track],
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
    granularity: Granularity,
) -> Vec<Bucket> {
    let samples = tracks.iter().filter_map(|t| {
        let s = compute_stats(&t.points);
        s.start_time.map(|st| (st, s.total_distance_km))
    });
    bucketize_samples(samples, window_start, window_end, granularity)
}

/// Earliest and latest timestamp carried by any point.
pub fn data_window(points: &[GeoPoint]) -> Option<(OffsetDateTime, OffsetDateTime)> {
    points.iter().filter_map(|p| p.time).fold(None, |acc, t| match acc {
        None => Some((t, t)),
        Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
    })
}

fn bucketize_samples<I>(
    samples: I,
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
    granularity: Granularity,
) -> Vec<Bucket>
where
    I: IntoIterator<Item = (OffsetDateTime, f64)>,
{
    if window_end < window_start {
        return Vec::new();
    }
    let offset = window_start.offset();
    let end = window_end.to_offset(offset);

    let mut starts = Vec::new();
    let mut cur = floor(window_start, granularity);
    while cur <= end {
        starts.push(cur);
        match advance(cur, granularity) {
            Some(next) => cur = next,
            None => break,
        }
    }

    let mut totals = vec![0.0_f64; starts.len()];
    for (t, km) in samples {
        if t < window_start || t > window_end {
            continue;
        }
        let t = t.to_offset(offset);
        // starts[0] <= window_start <= t, so the index is never below zero
        let idx = starts.partition_point(|s| *s <= t);
        if let Some(slot) = idx.checked_sub(1).and_then(|i| totals.get_mut(i)) {
            *slot += km;
        }
    }

    starts
        .into_iter()
        .zip(totals)
        .map(|(start, total_km)| Bucket {
            label: label(start, granularity),
            start,
            total_km,
        })
        .collect()
}

fn floor(t: OffsetDateTime, g: Granularity) -> OffsetDateTime {
    let midnight = t.replace_time(Time::MIDNIGHT);
    match g {
        Granularity::Hour => midnight + Duration::hours(i64::from(t.hour())),
        Granularity::Day => midnight,
        Granularity::Month => midnight - Duration::days(i64::from(t.day()) - 1),
        Granularity::Year => midnight - Duration::days(i64::from(t.ordinal()) - 1),
    }
}

/// Start of the following unit; `t` must already be floored.
fn advance(t: OffsetDateTime, g: Granularity) -> Option<OffsetDateTime> {
    let step = match g {
        Granularity::Hour => Duration::hours(1),
        Granularity::Day => Duration::days(1),
        Granularity::Month => {
            Duration::days(i64::from(util::days_in_year_month(t.year(), t.month())))
        }
        Granularity::Year => Duration::days(i64::from(util::days_in_year(t.year()))),
    };
    t.checked_add(step)
}

fn label(t: OffsetDateTime, g: Granularity) -> String {
    let (y, m, d) = (t.year(), u8::from(t.month()), t.day());
    match g {
        Granularity::Hour => format!("{y:04}-{m:02}-{d:02} {:02}:00", t.hour()),
        Granularity::Day => format!("{y:04}-{m:02}-{d:02}"),
        Granularity::Month => format!("{y:04}-{m:02}"),
        Granularity::Year => format!("{y:04}"),
    }
}
