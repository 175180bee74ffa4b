mod error;
mod gpx_file;

pub use error::IngestError;
pub use gpx_file::{export_gpx, parse_gpx, parse_gpx_document};

use anyhow::Result;
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;
use model::*;

/// Load tracks from a `.gpx`, `.csv` or `.ndjson`/`.jsonl` file.
pub fn import_file(path: &Path) -> Result<Vec<Track>> {
    Ok(import_document(path)?.tracks)
}

/// Load a whole file. Only GPX carries metadata and waypoints; the other
/// formats give a document with tracks alone.
pub fn import_document(path: &Path) -> Result<Document> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let doc = match ext.as_str() {
        "gpx" => {
            let bytes = std::fs::read(path).map_err(IngestError::from)?;
            parse_gpx_document(&bytes, &source)?
        }
        "csv" => Document::from_tracks(&source, import_csv(path)?),
        "ndjson" | "jsonl" => Document::from_tracks(&source, import_ndjson(path)?),
        _ => return Err(IngestError::UnsupportedFormat(source).into()),
    };
    debug!(
        file = %path.display(),
        tracks = doc.tracks.len(),
        waypoints = doc.waypoints.len(),
        "imported"
    );
    Ok(doc)
}

/// Drop points whose coordinates are not finite or out of range, and clear
/// non-finite elevations.
pub fn retain_finite(points: Vec<GeoPoint>) -> Vec<GeoPoint> {
    let before = points.len();
    let out: Vec<GeoPoint> = points
        .into_iter()
        .filter(|p| p.has_valid_coords())
        .map(|mut p| {
            if p.elevation.is_some_and(|e| !e.is_finite()) {
                p.elevation = None;
            }
            p
        })
        .collect();
    if out.len() < before {
        warn!(dropped = before - out.len(), kept = out.len(), "dropped points with invalid coordinates");
    }
    out
}

/// Read a points CSV. Consecutive rows with the same `track_id` form one
/// track; ids that are not UUIDs still group rows but get a fresh id.
pub fn import_csv(path: &Path) -> Result<Vec<Track>> {
    let source = path.file_name().and_then(|n| n.to_str()).unwrap_or("csv").to_string();
    let mut rdr = csv::Reader::from_path(path)?;
    let mut tracks = Vec::<Track>::new();
    let mut current: Option<(String, String, Vec<GeoPoint>)> = None;
    for rec in rdr.deserialize() {
        let r: CsvRow = rec?;
        if current.as_ref().map(|(key, _, _)| key.as_str()) != Some(r.track_id.as_str()) {
            if let Some((key, name, pts)) = current.take() {
                push_csv_track(&mut tracks, &key, &name, &source, pts);
            }
            current = Some((r.track_id.clone(), r.name.clone(), vec![]));
        }
        if let Some((_, _, pts)) = &mut current {
            let time = if r.time.is_empty() {
                None
            } else {
                Some(OffsetDateTime::parse(&r.time, &Rfc3339)?)
            };
            pts.push(GeoPoint { lat: r.lat, lon: r.lon, elevation: r.elevation, time });
        }
    }
    if let Some((key, name, pts)) = current.take() {
        push_csv_track(&mut tracks, &key, &name, &source, pts);
    }
    Ok(tracks)
}

fn push_csv_track(out: &mut Vec<Track>, key: &str, name: &str, source: &str, raw: Vec<GeoPoint>) {
    let points = retain_finite(raw);
    if points.is_empty() {
        debug!(source, name, "skipping track without usable points");
        return;
    }
    let mut track = Track::new(name, source, points);
    if let Ok(id) = Uuid::parse_str(key) {
        track.id = id;
    }
    out.push(track);
}

pub fn export_csv(tracks: &[Track], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    for t in tracks {
        let track_id = t.id.simple().to_string();
        for p in &t.points {
            let time = match p.time {
                Some(ts) => ts.format(&Rfc3339)?,
                None => String::new(),
            };
            w.serialize(CsvRow {
                track_id: track_id.clone(),
                name: t.meta.name.clone(),
                lat: p.lat,
                lon: p.lon,
                elevation: p.elevation,
                time,
            })?;
        }
    }
    w.flush()?;
    Ok(())
}

pub fn import_ndjson(path: &Path) -> Result<Vec<Track>> {
    let f = File::open(path)?;
    let rdr = BufReader::new(f);
    let mut tracks = vec![];
    for line in rdr.lines() {
        let s = line?;
        if s.trim().is_empty() {
            continue;
        }
        let mut t: Track = serde_json::from_str(&s)?;
        t.points = retain_finite(std::mem::take(&mut t.points));
        if t.points.is_empty() {
            debug!(name = %t.meta.name, "skipping track without usable points");
            continue;
        }
        tracks.push(t);
    }
    Ok(tracks)
}

pub fn export_ndjson(tracks: &[Track], path: &Path) -> Result<()> {
    let f = File::create(path)?;
    let mut w = BufWriter::new(f);
    for t in tracks {
        let s = serde_json::to_string(t)?;
        writeln!(w, "{}", s)?;
    }
    w.flush()?;
    Ok(())
}

/// One row per track with its aggregate figures, for spreadsheets.
pub fn export_stats_csv(rows: &[(TrackMeta, TrackStats)], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    w.write_record([
        "Name", "Source", "DistanceKm", "Ascent", "Descent", "MinElevation", "MaxElevation",
        "Start", "End", "DurationS", "AvgSpeedKmh", "MaxSpeedKmh", "MovingS", "Points",
    ])?;
    let opt = |v: Option<f64>, prec: usize| v.map(|x| format!("{:.*}", prec, x)).unwrap_or_default();
    let ts = |v: Option<OffsetDateTime>| -> Result<String> {
        Ok(match v {
            Some(t) => t.format(&Rfc3339)?,
            None => String::new(),
        })
    };
    for (meta, s) in rows {
        w.write_record(&[
            meta.name.clone(),
            meta.source.clone(),
            format!("{:.3}", s.total_distance_km),
            format!("{:.1}", s.total_ascent),
            format!("{:.1}", s.total_descent),
            opt(s.min_elevation, 1),
            opt(s.max_elevation, 1),
            ts(s.start_time)?,
            ts(s.end_time)?,
            s.duration_ms.map(|ms| format!("{:.0}", ms as f64 / 1000.0)).unwrap_or_default(),
            opt(s.average_speed_kmh, 2),
            opt(s.max_speed_kmh, 2),
            s.moving_duration_ms.map(|ms| format!("{:.0}", ms as f64 / 1000.0)).unwrap_or_default(),
            format!("{}", s.point_count),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_buckets_csv(buckets: &[Bucket], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    w.write_record(["Label", "Start", "TotalKm"])?;
    for b in buckets {
        w.write_record(&[
            b.label.clone(),
            b.start.format(&Rfc3339)?,
            format!("{:.3}", b.total_km),
        ])?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct CsvRow {
    track_id: String,
    name: String,
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
    time: String,
}
