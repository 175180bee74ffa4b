use std::{fs::File, io::BufWriter, path::Path};

use anyhow::Result;
use gpx::{Gpx, GpxVersion};
use model::{Document, DocumentMeta, GeoPoint, Track, Waypoint};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{retain_finite, IngestError};

/// Parse a GPX 1.0/1.1 document into one track per `<trk>` and per `<rte>`.
///
/// Segments of a `<trk>` are concatenated in document order. Tracks that end
/// up without a usable point are skipped.
pub fn parse_gpx(input: &[u8], source: &str) -> Result<Vec<Track>, IngestError> {
    let doc = parse_gpx_document(input, source)?;
    if doc.tracks.is_empty() {
        return Err(IngestError::NoTracks(source.to_string()));
    }
    Ok(doc.tracks)
}

/// Like [`parse_gpx`], but also keeps `<metadata>` and `<wpt>` markers. A file
/// with waypoints and no track is accepted.
pub fn parse_gpx_document(input: &[u8], source: &str) -> Result<Document, IngestError> {
    let (cleaned, dropped) = drop_invalid_points(input)?;
    if dropped > 0 {
        warn!(source, dropped, "dropped gpx points with invalid coordinates");
    }
    let doc = gpx::read(cleaned.as_slice()).map_err(|e| IngestError::Gpx(e.to_string()))?;
    let mut tracks = Vec::with_capacity(doc.tracks.len() + doc.routes.len());

    for (i, trk) in doc.tracks.into_iter().enumerate() {
        let name = trk.name.unwrap_or_else(|| format!("Track {}", i + 1));
        let raw: Vec<GeoPoint> = trk
            .segments
            .into_iter()
            .flat_map(|seg| seg.points)
            .map(to_geo_point)
            .collect();
        push_track(&mut tracks, &name, source, raw);
    }

    for (i, rte) in doc.routes.into_iter().enumerate() {
        let name = rte.name.unwrap_or_else(|| format!("Route {}", i + 1));
        let raw: Vec<GeoPoint> = rte.points.into_iter().map(to_geo_point).collect();
        push_track(&mut tracks, &name, source, raw);
    }

    let waypoints: Vec<Waypoint> = doc
        .waypoints
        .into_iter()
        .enumerate()
        .map(|(i, wp)| to_waypoint(i, wp))
        .collect();

    if tracks.is_empty() && waypoints.is_empty() {
        return Err(IngestError::NoTracks(source.to_string()));
    }

    let meta = doc
        .metadata
        .map(|m| DocumentMeta {
            name: m.name,
            desc: m.description,
            author: m.author.and_then(|a| a.name),
            time: m.time.map(OffsetDateTime::from),
        })
        .unwrap_or_default();

    debug!(source, tracks = tracks.len(), waypoints = waypoints.len(), "parsed gpx");
    Ok(Document {
        source: source.to_string(),
        meta,
        waypoints,
        tracks,
    })
}

fn push_track(out: &mut Vec<Track>, name: &str, source: &str, raw: Vec<GeoPoint>) {
    let points = retain_finite(raw);
    if points.is_empty() {
        debug!(source, name, "skipping track without usable points");
        return;
    }
    out.push(Track::new(name, source, points));
}

fn to_geo_point(wp: gpx::Waypoint) -> GeoPoint {
    let p = wp.point();
    GeoPoint {
        lat: p.y(),
        lon: p.x(),
        elevation: wp.elevation.filter(|e| e.is_finite()),
        time: wp.time.map(OffsetDateTime::from),
    }
}

fn to_waypoint(index: usize, wp: gpx::Waypoint) -> Waypoint {
    let p = wp.point();
    Waypoint {
        name: wp.name.unwrap_or_else(|| format!("Waypoint {}", index + 1)),
        lat: p.y(),
        lon: p.x(),
        elevation: wp.elevation.filter(|e| e.is_finite()),
        time: wp.time.map(OffsetDateTime::from),
        desc: wp.description,
        sym: wp.symbol,
    }
}

/// Copy `input` without the `<trkpt>`, `<rtept>` and `<wpt>` elements whose
/// coordinates are missing, not finite or out of range. Returns the cleaned
/// document and how many points were dropped.
fn drop_invalid_points(input: &[u8]) -> Result<(Vec<u8>, usize), IngestError> {
    let mut reader = Reader::from_reader(input);
    let mut writer = Writer::new(Vec::with_capacity(input.len()));
    let mut buf = Vec::new();
    // depth inside a dropped element
    let mut skipping = 0usize;
    let mut dropped = 0usize;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(IngestError::Gpx(format!(
                    "at position {}: {e}",
                    reader.buffer_position()
                )));
            }
            Ok(Event::Eof) => break,
            Ok(event) => event.into_owned(),
        };

        let keep = if skipping > 0 {
            match event {
                Event::Start(_) => skipping += 1,
                Event::End(_) => skipping -= 1,
                _ => {}
            }
            false
        } else {
            match event {
                Event::Start(ref e) if is_point(e) && !point_in_range(e) => {
                    skipping = 1;
                    dropped += 1;
                    false
                }
                Event::Empty(ref e) if is_point(e) && !point_in_range(e) => {
                    dropped += 1;
                    false
                }
                _ => true,
            }
        };

        if keep {
            writer
                .write_event(event)
                .map_err(|e| IngestError::Gpx(e.to_string()))?;
        }
        buf.clear();
    }

    Ok((writer.into_inner(), dropped))
}

fn is_point(e: &BytesStart) -> bool {
    matches!(e.name().as_ref(), b"trkpt" | b"rtept" | b"wpt")
}

fn point_in_range(e: &BytesStart) -> bool {
    let mut lat = f64::NAN;
    let mut lon = f64::NAN;
    for attr in e.attributes().flatten() {
        let value = std::str::from_utf8(&attr.value)
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(f64::NAN);
        match attr.key.as_ref() {
            b"lat" => lat = value,
            b"lon" => lon = value,
            _ => {}
        }
    }
    GeoPoint::new(lat, lon).has_valid_coords()
}

/// Write tracks as a GPX 1.1 document, one `<trk>` with a single segment each.
pub fn export_gpx(tracks: &[Track], path: &Path) -> Result<()> {
    let mut doc = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("ridestats".into()),
        ..Default::default()
    };
    for t in tracks {
        let mut seg = gpx::TrackSegment::default();
        for p in &t.points {
            let mut wp = gpx::Waypoint::new(geo::Point::new(p.lon, p.lat));
            wp.elevation = p.elevation;
            wp.time = p.time.map(gpx::Time::from);
            seg.points.push(wp);
        }
        doc.tracks.push(gpx::Track {
            name: Some(t.meta.name.clone()),
            segments: vec![seg],
            ..Default::default()
        });
    }

    let f = File::create(path)?;
    gpx::write(&doc, BufWriter::new(f)).map_err(|e| IngestError::Gpx(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Morning ride</name>
    <trkseg>
      <trkpt lat="51.0" lon="4.0"><ele>10</ele><time>2024-05-01T08:00:00Z</time></trkpt>
      <trkpt lat="51.0" lon="4.01"><ele>20</ele><time>2024-05-01T08:01:00Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="51.001" lon="4.02"><time>2024-05-01T08:05:00Z</time></trkpt>
    </trkseg>
  </trk>
  <trk>
    <trkseg>
      <trkpt lat="50.9" lon="4.1"></trkpt>
    </trkseg>
  </trk>
  <rte>
    <rtept lat="50.0" lon="5.0"></rtept>
    <rtept lat="50.1" lon="5.1"></rtept>
  </rte>
</gpx>"#;

    fn with_middle_lat(lat: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="51.0" lon="4.0"><ele>10</ele></trkpt>
    <trkpt lat="{lat}" lon="4.005"><ele>15</ele><time>2024-05-01T08:00:30Z</time></trkpt>
    <trkpt lat="51.0" lon="4.01"><ele>20</ele></trkpt>
  </trkseg></trk>
</gpx>"#
        )
    }

    #[test]
    fn test_parse_tracks_and_routes() {
        let tracks = parse_gpx(SAMPLE.as_bytes(), "sample.gpx").unwrap();
        assert_eq!(tracks.len(), 3);

        assert_eq!(tracks[0].meta.name, "Morning ride");
        assert_eq!(tracks[0].meta.source, "sample.gpx");
        assert_eq!(tracks[0].points.len(), 3);
        assert_eq!(tracks[0].points[1].lon, 4.01);
        assert_eq!(tracks[0].points[1].elevation, Some(20.0));
        assert!(tracks[0].points[2].elevation.is_none());
        assert_eq!(
            tracks[0].points[0].time.map(|t| t.unix_timestamp()),
            Some(1_714_550_400)
        );

        assert_eq!(tracks[1].meta.name, "Track 2");
        assert!(tracks[1].points[0].time.is_none());
        assert_eq!(tracks[2].meta.name, "Route 1");
        assert_eq!(tracks[2].points.len(), 2);
    }

    #[test]
    fn test_invalid_point_is_dropped_not_the_file() {
        for lat in ["NaN", "95", "inf", "", "north"] {
            let doc = with_middle_lat(lat);
            let tracks = parse_gpx(doc.as_bytes(), "bad-point.gpx").unwrap();
            assert_eq!(tracks.len(), 1, "lat={lat}");
            let pts = &tracks[0].points;
            assert_eq!(pts.len(), 2, "lat={lat}");
            assert_eq!(pts[0].elevation, Some(10.0));
            assert_eq!(pts[1].elevation, Some(20.0));
            assert!(pts.iter().all(|p| p.time.is_none()));
        }
    }

    #[test]
    fn test_self_closing_and_route_points_filtered() {
        let doc = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="-91" lon="4.0"><name>nowhere</name></wpt>
  <trk><trkseg>
    <trkpt lat="51.0" lon="4.0"/>
    <trkpt lat="51.0" lon="400"/>
    <trkpt lat="51.0" lon="4.01"/>
  </trkseg></trk>
  <rte>
    <rtept lat="NaN" lon="5.0"/>
  </rte>
</gpx>"#;
        let parsed = parse_gpx_document(doc.as_bytes(), "mixed.gpx").unwrap();
        assert!(parsed.waypoints.is_empty());
        assert_eq!(parsed.tracks.len(), 1);
        assert_eq!(parsed.tracks[0].points.len(), 2);
    }

    #[test]
    fn test_waypoints_and_metadata() {
        let doc = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata>
    <name>Weekend</name>
    <desc>Two rides</desc>
    <author><name>Sam</name></author>
    <time>2024-05-01T07:00:00Z</time>
  </metadata>
  <wpt lat="51.2" lon="4.4"><ele>5</ele><name>Cafe</name><desc>Coffee stop</desc><sym>Restaurant</sym></wpt>
  <wpt lat="51.3" lon="4.5"></wpt>
  <trk><trkseg><trkpt lat="51.0" lon="4.0"></trkpt></trkseg></trk>
</gpx>"#;
        let parsed = parse_gpx_document(doc.as_bytes(), "weekend.gpx").unwrap();
        assert_eq!(parsed.source, "weekend.gpx");
        assert_eq!(parsed.meta.name.as_deref(), Some("Weekend"));
        assert_eq!(parsed.meta.desc.as_deref(), Some("Two rides"));
        assert_eq!(parsed.meta.author.as_deref(), Some("Sam"));
        assert_eq!(parsed.meta.time.map(|t| t.unix_timestamp()), Some(1_714_546_800));

        assert_eq!(parsed.waypoints.len(), 2);
        let cafe = &parsed.waypoints[0];
        assert_eq!(cafe.name, "Cafe");
        assert_eq!(cafe.lat, 51.2);
        assert_eq!(cafe.elevation, Some(5.0));
        assert_eq!(cafe.desc.as_deref(), Some("Coffee stop"));
        assert_eq!(cafe.sym.as_deref(), Some("Restaurant"));
        assert_eq!(parsed.waypoints[1].name, "Waypoint 2");
        assert_eq!(parsed.tracks.len(), 1);
    }

    #[test]
    fn test_waypoints_only_document() {
        let doc = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="51.2" lon="4.4"><name>Cafe</name></wpt>
</gpx>"#;
        let parsed = parse_gpx_document(doc.as_bytes(), "poi.gpx").unwrap();
        assert!(parsed.tracks.is_empty());
        assert_eq!(parsed.waypoints.len(), 1);
        assert!(matches!(
            parse_gpx(doc.as_bytes(), "poi.gpx").unwrap_err(),
            IngestError::NoTracks(_)
        ));
    }

    #[test]
    fn test_document_without_tracks() {
        let doc = r#"<?xml version="1.0"?><gpx version="1.1" creator="x" xmlns="http://www.topografix.com/GPX/1/1"></gpx>"#;
        let err = parse_gpx(doc.as_bytes(), "empty.gpx").unwrap_err();
        assert!(matches!(err, IngestError::NoTracks(_)));
    }

    #[test]
    fn test_garbage_is_gpx_error() {
        let err = parse_gpx(b"not xml at all", "bad.gpx").unwrap_err();
        assert!(matches!(err, IngestError::Gpx(_)));
    }

    #[test]
    fn test_export_then_parse() {
        let original = parse_gpx(SAMPLE.as_bytes(), "sample.gpx").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gpx");
        export_gpx(&original, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let back = parse_gpx(&bytes, "out.gpx").unwrap();
        assert_eq!(back.len(), original.len());
        for (a, b) in original.iter().zip(&back) {
            assert_eq!(a.meta.name, b.meta.name);
            assert_eq!(a.points, b.points);
        }
    }
}
