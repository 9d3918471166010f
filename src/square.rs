use crate::projection;
use crate::types::CanonicalLocation;
use geo::{Coord, Rect};

/// Closed 5-point ring for the ROI square, [bl, br, tr, tl, bl]. Degree
/// deltas come from the equirectangular conversion; this is the strategy the
/// square has always used, independent of the overlay families.
pub fn square_ring(location: &CanonicalLocation) -> [Coord<f64>; 5] {
    let lat_delta = projection::lat_delta_deg(location.distance_to_edge);
    let lng_delta = projection::lng_delta_deg(location.distance_to_edge, location.latitude);
    ring_around(location.center(), lng_delta, lat_delta)
}

/// A drag event collapsed back into canonical square form.
#[derive(Debug, Clone, PartialEq)]
pub struct Squared {
    pub ring: [Coord<f64>; 5],
    pub center: Coord<f64>,
    /// Half-side in degrees, shared by both axes.
    pub half_side_deg: f64,
}

/// Re-square raw vertices from the draw layer. Only the first four vertices
/// count; anything after them is midpoint handles and the closing vertex.
/// The draw layer itself does not guarantee squares, so every drag, whichever
/// vertex moved, collapses to the symmetric square around the recomputed
/// bounding-box center.
pub fn resquare(raw: &[Coord<f64>]) -> Option<Squared> {
    if raw.len() < 4 {
        return None;
    }
    let corners = &raw[..4];

    let mut min = corners[0];
    let mut max = corners[0];
    for c in corners {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
    }
    let center = Coord {
        x: (min.x + max.x) / 2.0,
        y: (min.y + max.y) / 2.0,
    };

    let half_side_deg = corners
        .iter()
        .map(|c| (c.y - center.y).abs().max((c.x - center.x).abs()))
        .fold(0.0, f64::max);

    Some(Squared {
        ring: ring_around(center, half_side_deg, half_side_deg),
        center,
        half_side_deg,
    })
}

/// Axis-aligned bounding box of a ring, for fit-view requests.
pub fn bounds(ring: &[Coord<f64>]) -> Option<Rect<f64>> {
    let first = *ring.first()?;
    let (min, max) = ring.iter().fold((first, first), |(mut min, mut max), c| {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
        (min, max)
    });
    Some(Rect::new(min, max))
}

fn ring_around(center: Coord<f64>, lng_delta: f64, lat_delta: f64) -> [Coord<f64>; 5] {
    let bl = Coord {
        x: center.x - lng_delta,
        y: center.y - lat_delta,
    };
    let br = Coord {
        x: center.x + lng_delta,
        y: center.y - lat_delta,
    };
    let tr = Coord {
        x: center.x + lng_delta,
        y: center.y + lat_delta,
    };
    let tl = Coord {
        x: center.x - lng_delta,
        y: center.y + lat_delta,
    };
    [bl, br, tr, tl, bl]
}
