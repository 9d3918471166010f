use geo::Coord;
use serde::Deserialize;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// Meters per degree of latitude.
pub const METERS_PER_DEG_LAT: f64 = 110_574.0;
/// Meters per degree of longitude at the equator.
pub const METERS_PER_DEG_LNG: f64 = 111_320.0;
/// Fixed-radius approximation used to turn dragged degree offsets back into
/// meters. Deliberately not geodesic; close enough at kilometer scale.
pub const DRAG_METERS_PER_DEG: f64 = 111_000.0;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Strategy for deriving the north/south latitude bounds of an overlay.
/// Both are valid at kilometer scale but not numerically identical, so which
/// family uses which is a config decision, not a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionKind {
    Equirectangular,
    Mercator,
}

pub fn lat_delta_deg(meters: f64) -> f64 {
    meters / METERS_PER_DEG_LAT
}

pub fn lng_delta_deg(meters: f64, latitude: f64) -> f64 {
    meters / (METERS_PER_DEG_LNG * latitude.to_radians().cos())
}

fn mercator_y(latitude: f64) -> f64 {
    EARTH_RADIUS_M * (FRAC_PI_4 + latitude.to_radians() / 2.0).tan().ln()
}

fn inverse_mercator_lat(y: f64) -> f64 {
    (2.0 * (y / EARTH_RADIUS_M).exp().atan() - FRAC_PI_2).to_degrees()
}

/// (north, south) latitude bounds of a radius around `latitude`.
pub fn lat_bounds(kind: ProjectionKind, latitude: f64, meters: f64) -> (f64, f64) {
    match kind {
        ProjectionKind::Equirectangular => {
            let delta = lat_delta_deg(meters);
            (latitude + delta, latitude - delta)
        }
        ProjectionKind::Mercator => {
            let y = mercator_y(latitude);
            (
                inverse_mercator_lat(y + meters),
                inverse_mercator_lat(y - meters),
            )
        }
    }
}

/// Raster image corner coordinates in [tl, tr, br, bl] order. Longitude
/// deltas are equirectangular for both strategies; only the latitude bounds
/// differ.
pub fn corners(kind: ProjectionKind, center: Coord<f64>, half_side_m: f64) -> [Coord<f64>; 4] {
    let (north, south) = lat_bounds(kind, center.y, half_side_m);
    let lng_delta = lng_delta_deg(half_side_m, center.y);
    let west = center.x - lng_delta;
    let east = center.x + lng_delta;
    [
        Coord { x: west, y: north },
        Coord { x: east, y: north },
        Coord { x: east, y: south },
        Coord { x: west, y: south },
    ]
}

/// Meters represented by a dragged half-side in degrees.
pub fn drag_deg_to_meters(half_side_deg: f64) -> f64 {
    half_side_deg * DRAG_METERS_PER_DEG
}
