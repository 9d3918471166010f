use crate::config::MapConfig;
use crate::types::{CanonicalLocation, ParsedRequest};
use serde_json::Value;
use tracing::debug;

/// Resolve a parsed request into a canonical location. Explicit
/// latitude/longitude fields win over the flexible `location` descriptor.
/// Returns None only when no coordinate pair can be resolved at all.
pub fn normalize(request: &ParsedRequest, map: &MapConfig) -> Option<CanonicalLocation> {
    let pair = match (request.latitude, request.longitude) {
        (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
        _ => request.location.as_ref().and_then(resolve_descriptor),
    };

    let Some((lat, lng)) = pair else {
        debug!("request carried no resolvable coordinate pair");
        return None;
    };

    Some(canonical(lat, lng, request.distance_to_edge, map))
}

/// Canonicalize coordinates already known to be in (lat, lng) order, e.g.
/// from an analysis result object.
pub fn from_fields(
    latitude: Option<f64>,
    longitude: Option<f64>,
    distance_to_edge: Option<f64>,
    map: &MapConfig,
) -> Option<CanonicalLocation> {
    match (latitude, longitude) {
        (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
            Some(canonical(lat, lng, distance_to_edge, map))
        }
        _ => {
            debug!("result is missing coordinates");
            None
        }
    }
}

fn canonical(lat: f64, lng: f64, distance: Option<f64>, map: &MapConfig) -> CanonicalLocation {
    CanonicalLocation {
        latitude: lat.clamp(-90.0, 90.0),
        longitude: lng.clamp(-180.0, 180.0),
        distance_to_edge: resolve_distance(distance, map),
    }
}

/// Distance is always meters; no unit inference. Absent or non-finite values
/// take the default, resolved values are floored so the square never
/// degenerates to a point.
pub fn resolve_distance(raw: Option<f64>, map: &MapConfig) -> f64 {
    match raw {
        Some(d) if d.is_finite() => d.max(map.min_distance_m),
        _ => map.default_distance_m,
    }
}

/// Pull a (lat, lng) pair out of whatever shape the upstream parser produced:
/// an object with any of the usual key spellings, a 2-element array, or a
/// "a, b" string. Array and string forms have unknown axis order.
pub fn resolve_descriptor(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Object(map) => {
            let lat = number_field(map, &["lat", "latitude"])?;
            let lng = number_field(map, &["lng", "lon", "longitude"])?;
            Some((lat, lng))
        }
        Value::Array(items) => {
            if items.len() != 2 {
                return None;
            }
            disambiguate(as_number(&items[0])?, as_number(&items[1])?)
        }
        Value::String(s) => {
            let mut parts = s.split(',').map(str::trim);
            let a0: f64 = parts.next()?.parse().ok()?;
            let a1: f64 = parts.next()?.parse().ok()?;
            if parts.next().is_some() {
                return None;
            }
            disambiguate(a0, a1)
        }
        _ => None,
    }
}

/// Decide which of two numbers is the latitude. An ordering is accepted when
/// it is plausible and the reverse is not; when both orderings are plausible
/// the first value is taken as latitude.
fn disambiguate(a0: f64, a1: f64) -> Option<(f64, f64)> {
    let lat_ok = |v: f64| v.is_finite() && v.abs() <= 90.0;
    let lng_ok = |v: f64| v.is_finite() && v.abs() <= 180.0;

    let forward = lat_ok(a0) && lng_ok(a1);
    let reverse = lat_ok(a1) && lng_ok(a0);

    match (forward, reverse) {
        (true, _) => Some((a0, a1)),
        (false, true) => Some((a1, a0)),
        (false, false) => {
            debug!(a0, a1, "neither ordering yields a valid coordinate pair");
            None
        }
    }
}

fn number_field(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| map.get(*k).and_then(as_number))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse().ok().filter(|v: &f64| v.is_finite()),
        _ => None,
    }
}
