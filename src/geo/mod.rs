//! Planar geometry kernel: ray-cast containment and shoelace centroids
//! over GeoJSON-ordered ring coordinates, plus great-circle distance.
//!
//! Coordinates in rings are `[lng, lat]` pairs treated as Cartesian; the
//! haversine function is the only place sphericity matters.

pub mod boundary;

use crate::constants::{AREA_EPSILON, EARTH_RADIUS_METERS};
use serde::{Deserialize, Serialize};

/// A linear ring of `[lng, lat]` positions. Rings are implicitly closed:
/// a ring whose first and last coordinates differ is treated as if the
/// first were appended.
pub type Ring = Vec<[f64; 2]>;

/// Polygon geometry as it appears in a GeoJSON feature. Outer ring
/// first, subsequent rings are holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
}

/// The ring's vertices with any explicit closing coordinate dropped.
fn unique_vertices(ring: &[[f64; 2]]) -> &[[f64; 2]] {
    match ring.split_last() {
        Some((last, rest)) if !rest.is_empty() && *last == ring[0] => rest,
        _ => ring,
    }
}

/// Even-odd ray cast against a single ring. Degenerate rings (fewer than
/// four coordinates once closed) contain nothing.
fn ring_contains(lng: f64, lat: f64, ring: &[[f64; 2]]) -> bool {
    let verts = unique_vertices(ring);
    if verts.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let [xi, yi] = verts[i];
        let [xj, yj] = verts[j];
        if (yi > lat) != (yj > lat) && lng < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Containment against a polygon's rings: the outer ring grants
/// containment, any hole ring revokes it.
pub fn point_in_polygon(lng: f64, lat: f64, rings: &[Ring]) -> bool {
    let Some(outer) = rings.first() else {
        return false;
    };
    if !ring_contains(lng, lat, outer) {
        return false;
    }
    !rings[1..].iter().any(|hole| ring_contains(lng, lat, hole))
}

/// Containment against either geometry kind. A multipolygon contains the
/// point when any constituent polygon does.
pub fn point_in_feature(lng: f64, lat: f64, geometry: &Geometry) -> bool {
    match geometry {
        Geometry::Polygon { coordinates } => point_in_polygon(lng, lat, coordinates),
        Geometry::MultiPolygon { coordinates } => coordinates
            .iter()
            .any(|polygon| point_in_polygon(lng, lat, polygon)),
    }
}

/// Shoelace signed area (doubled) and centroid numerator sums for one ring.
fn ring_accumulators(ring: &[[f64; 2]]) -> (f64, f64, f64) {
    let verts = unique_vertices(ring);
    if verts.len() < 3 {
        return (0.0, 0.0, 0.0);
    }
    let mut area2 = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for i in 0..verts.len() {
        let j = (i + 1) % verts.len();
        let cross = verts[i][0] * verts[j][1] - verts[j][0] * verts[i][1];
        area2 += cross;
        sx += (verts[i][0] + verts[j][0]) * cross;
        sy += (verts[i][1] + verts[j][1]) * cross;
    }
    (area2, sx, sy)
}

/// Ring accumulators with the sign forced: positive for outer rings,
/// negative for holes, regardless of source winding order.
fn oriented_accumulators(ring: &[[f64; 2]], outer: bool) -> (f64, f64, f64) {
    let (area2, sx, sy) = ring_accumulators(ring);
    let keep = if outer { area2 >= 0.0 } else { area2 <= 0.0 };
    if keep {
        (area2, sx, sy)
    } else {
        (-area2, -sx, -sy)
    }
}

/// Signed-area-weighted centroid, holes subtracted, returned as
/// `[lat, lng]`. Near-zero total area falls back to the arithmetic mean
/// of the first ring's vertices rather than dividing by zero.
pub fn centroid(geometry: &Geometry) -> [f64; 2] {
    let polygons: Vec<&Vec<Ring>> = match geometry {
        Geometry::Polygon { coordinates } => vec![coordinates],
        Geometry::MultiPolygon { coordinates } => coordinates.iter().collect(),
    };

    let mut area2 = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for rings in &polygons {
        for (i, ring) in rings.iter().enumerate() {
            let (a, x, y) = oriented_accumulators(ring, i == 0);
            area2 += a;
            sx += x;
            sy += y;
        }
    }

    if area2.abs() < AREA_EPSILON {
        let first_ring = polygons
            .iter()
            .flat_map(|rings| rings.first())
            .next()
            .map(|ring| unique_vertices(ring))
            .unwrap_or(&[]);
        if first_ring.is_empty() {
            return [0.0, 0.0];
        }
        let n = first_ring.len() as f64;
        let mean_lng = first_ring.iter().map(|v| v[0]).sum::<f64>() / n;
        let mean_lat = first_ring.iter().map(|v| v[1]).sum::<f64>() / n;
        return [mean_lat, mean_lng];
    }

    // area2 is twice the signed area, so the centroid divisor is 3 * area2.
    [sy / (3.0 * area2), sx / (3.0 * area2)]
}

/// Great-circle distance in meters between two `(lat, lng)` points.
pub fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lng2 - lng1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<Ring> {
        vec![vec![
            [0.0, 0.0],
            [size, 0.0],
            [size, size],
            [0.0, size],
            [0.0, 0.0],
        ]]
    }

    #[test]
    fn point_inside_square() {
        assert!(point_in_polygon(2.0, 2.0, &square(4.0)));
        assert!(!point_in_polygon(5.0, 2.0, &square(4.0)));
        assert!(!point_in_polygon(-1.0, -1.0, &square(4.0)));
    }

    #[test]
    fn unclosed_ring_is_closed_implicitly() {
        let open: Vec<Ring> = vec![vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]]];
        assert!(point_in_polygon(2.0, 2.0, &open));
        assert!(!point_in_polygon(6.0, 2.0, &open));
    }

    #[test]
    fn point_in_hole_is_outside() {
        let mut rings = square(10.0);
        rings.push(vec![
            [4.0, 4.0],
            [6.0, 4.0],
            [6.0, 6.0],
            [4.0, 6.0],
            [4.0, 4.0],
        ]);
        assert!(!point_in_polygon(5.0, 5.0, &rings));
        assert!(point_in_polygon(2.0, 2.0, &rings));
    }

    #[test]
    fn degenerate_ring_contains_nothing() {
        let degenerate: Vec<Ring> = vec![vec![[0.0, 0.0], [4.0, 0.0], [0.0, 0.0]]];
        assert!(!point_in_polygon(1.0, 0.0, &degenerate));
        assert!(!point_in_polygon(0.0, 0.0, &degenerate));
    }

    #[test]
    fn multipolygon_contains_via_any_member() {
        let geometry = Geometry::MultiPolygon {
            coordinates: vec![
                square(2.0),
                vec![vec![
                    [10.0, 10.0],
                    [12.0, 10.0],
                    [12.0, 12.0],
                    [10.0, 12.0],
                    [10.0, 10.0],
                ]],
            ],
        };
        assert!(point_in_feature(1.0, 1.0, &geometry));
        assert!(point_in_feature(11.0, 11.0, &geometry));
        assert!(!point_in_feature(5.0, 5.0, &geometry));
    }

    #[test]
    fn centroid_of_square() {
        let geometry = Geometry::Polygon {
            coordinates: square(4.0),
        };
        let [lat, lng] = centroid(&geometry);
        assert!((lat - 2.0).abs() < 1e-9);
        assert!((lng - 2.0).abs() < 1e-9);
    }

    #[test]
    fn centroid_subtracts_holes() {
        // Hole on the right half pulls the centroid left.
        let mut rings = square(10.0);
        rings.push(vec![
            [6.0, 2.0],
            [9.0, 2.0],
            [9.0, 8.0],
            [6.0, 8.0],
            [6.0, 2.0],
        ]);
        let geometry = Geometry::Polygon { coordinates: rings };
        let [lat, lng] = centroid(&geometry);
        assert!(lng < 5.0);
        assert!((lat - 5.0).abs() < 1.0);
    }

    #[test]
    fn zero_area_falls_back_to_vertex_mean() {
        let geometry = Geometry::Polygon {
            coordinates: vec![vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [0.0, 0.0]]],
        };
        let [lat, lng] = centroid(&geometry);
        assert!((lat - 0.0).abs() < 1e-9);
        assert!((lng - 1.0).abs() < 1e-9);
    }

    #[test]
    fn haversine_matches_known_distances() {
        // One degree of longitude at the equator.
        let d = haversine_meters(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_194.93).abs() < 1.0);

        assert_eq!(haversine_meters(6.82, 3.92, 6.82, 3.92), 0.0);
    }

    #[test]
    fn geometry_deserializes_from_geojson() {
        let geometry: Geometry = serde_json::from_str(
            r#"{"type":"Polygon","coordinates":[[[0.0,0.0],[4.0,0.0],[4.0,4.0],[0.0,4.0],[0.0,0.0]]]}"#,
        )
        .unwrap();
        assert!(point_in_feature(2.0, 2.0, &geometry));
    }
}
