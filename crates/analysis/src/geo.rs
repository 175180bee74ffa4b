use model::{BBox, GeoPoint};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometres.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    if a.lat == b.lat && a.lon == b.lon {
        return 0.0;
    }
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();

    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance from the previous point for every point; the first entry is 0.
pub fn segment_distances(points: &[GeoPoint]) -> Vec<f64> {
    let mut out = Vec::with_capacity(points.len());
    if points.is_empty() {
        return out;
    }
    out.push(0.0);
    for w in points.windows(2) {
        out.push(haversine_km(&w[0], &w[1]));
    }
    out
}

pub fn bounds(points: &[GeoPoint]) -> Option<BBox> {
    let first = points.first()?;
    let mut bb = BBox {
        min_lat: first.lat,
        max_lat: first.lat,
        min_lon: first.lon,
        max_lon: first.lon,
    };
    for p in &points[1..] {
        if p.lat < bb.min_lat { bb.min_lat = p.lat; }
        if p.lat > bb.max_lat { bb.max_lat = p.lat; }
        if p.lon < bb.min_lon { bb.min_lon = p.lon; }
        if p.lon > bb.max_lon { bb.max_lon = p.lon; }
    }
    Some(bb)
}
