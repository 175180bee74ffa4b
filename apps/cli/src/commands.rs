use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use model::*;
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::{info, warn};

use crate::settings::Settings;

pub fn load_documents(inputs: &[PathBuf]) -> Result<Vec<Document>> {
    if inputs.is_empty() {
        return Err(anyhow!("no input files supplied"));
    }
    let mut docs = Vec::with_capacity(inputs.len());
    for path in inputs {
        let doc = iox::import_document(path)
            .with_context(|| format!("loading {}", path.display()))?;
        info!(
            file = %path.display(),
            tracks = doc.tracks.len(),
            waypoints = doc.waypoints.len(),
            "loaded"
        );
        docs.push(doc);
    }
    Ok(docs)
}

pub fn load_tracks(inputs: &[PathBuf]) -> Result<Vec<Track>> {
    Ok(load_documents(inputs)?
        .into_iter()
        .flat_map(|d| d.tracks)
        .collect())
}

pub fn stats(docs: &[Document], settings: &Settings, profile: bool, csv: Option<&Path>) -> Result<Value> {
    let tracks: Vec<Track> = docs.iter().flat_map(|d| d.tracks.iter().cloned()).collect();
    let mut rows = Vec::with_capacity(tracks.len());
    let mut out = Vec::with_capacity(tracks.len());
    for t in &tracks {
        let s = analysis::compute_stats_with(&t.points, &settings.stats);
        let mut entry = json!({
            "name": t.meta.name,
            "source": t.meta.source,
            "stats": s,
            "bounds": analysis::bounds(&t.points),
        });
        if profile {
            entry["elevation_profile"] = analysis::elevation_profile(&t.points);
        }
        out.push(entry);
        rows.push((t.meta.clone(), s));
    }

    if let Some(path) = csv {
        iox::export_stats_csv(&rows, path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(file = %path.display(), "wrote stats csv");
    }

    let files: Vec<Value> = docs
        .iter()
        .map(|d| {
            json!({
                "source": d.source,
                "metadata": d.meta,
                "waypoints": d.waypoints,
            })
        })
        .collect();

    Ok(json!({
        "files": files,
        "tracks": out,
        "summary": analysis::tracks_summary(&tracks),
    }))
}

pub struct BucketRequest {
    pub granularity: Granularity,
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
    pub by_track: bool,
    pub skip_empty: bool,
}

pub fn buckets(tracks: &[Track], req: &BucketRequest, settings: &Settings) -> Result<Vec<Bucket>> {
    let data = if req.by_track {
        track_start_window(tracks)
    } else {
        tracks
            .iter()
            .filter_map(|t| analysis::data_window(&t.points))
            .reduce(|(a, b), (c, d)| (a.min(c), b.max(d)))
    };
    let Some((start, end)) = resolve_window(req.from, req.to, data, settings.utc_offset()?) else {
        warn!("no timestamps in input and no explicit window; nothing to bucket");
        return Ok(Vec::new());
    };

    let mut out = if req.by_track {
        analysis::bucketize_tracks(tracks, start, end, req.granularity)
    } else {
        let mut acc: Vec<Bucket> = Vec::new();
        for t in tracks {
            let next = analysis::bucketize(&t.points, start, end, req.granularity);
            merge_buckets(&mut acc, next);
        }
        acc
    };

    if req.skip_empty {
        out.retain(|b| b.total_km > 0.0);
    }
    Ok(out)
}

/// Point thinning applied before writing; both steps are optional.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sampling {
    pub interval: Option<Duration>,
    pub max_points: Option<usize>,
}

pub fn convert(tracks: &[Track], output: &Path, sampling: &Sampling) -> Result<()> {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let tracks = resample(tracks, sampling);
    match ext.as_str() {
        "gpx" => iox::export_gpx(&tracks, output)?,
        "csv" => iox::export_csv(&tracks, output)?,
        "ndjson" | "jsonl" => iox::export_ndjson(&tracks, output)?,
        _ => return Err(anyhow!("unsupported output format: {}", output.display())),
    }
    info!(file = %output.display(), tracks = tracks.len(), "converted");
    Ok(())
}

fn resample(tracks: &[Track], sampling: &Sampling) -> Vec<Track> {
    tracks
        .iter()
        .map(|t| {
            let mut t = t.clone();
            if let Some(interval) = sampling.interval {
                t.points = analysis::sample_by_time(&t.points, interval);
            }
            if let Some(max) = sampling.max_points {
                t.points = analysis::downsample(&t.points, max);
            }
            t
        })
        .collect()
}

fn track_start_window(tracks: &[Track]) -> Option<(OffsetDateTime, OffsetDateTime)> {
    tracks
        .iter()
        .filter_map(|t| t.points.iter().find_map(|p| p.time))
        .fold(None, |acc, t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
}

/// Explicit bounds win; missing ones come from the data, which is shifted
/// into `offset` so calendar buckets follow the configured zone.
fn resolve_window(
    from: Option<OffsetDateTime>,
    to: Option<OffsetDateTime>,
    data: Option<(OffsetDateTime, OffsetDateTime)>,
    offset: UtcOffset,
) -> Option<(OffsetDateTime, OffsetDateTime)> {
    match (from, to, data) {
        (Some(f), Some(t), _) => Some((f, t)),
        (f, t, Some((lo, hi))) => Some((f.unwrap_or(lo.to_offset(offset)), t.unwrap_or(hi))),
        _ => None,
    }
}

// Every call over the same window yields the same bucket starts.
fn merge_buckets(acc: &mut Vec<Bucket>, next: Vec<Bucket>) {
    if acc.is_empty() {
        *acc = next;
        return;
    }
    for (a, b) in acc.iter_mut().zip(next) {
        a.total_km += b.total_km;
    }
}
