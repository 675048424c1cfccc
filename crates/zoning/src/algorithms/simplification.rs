use geo::Simplify;
use geo_types::{Coord, LineString};

/// Douglas-Peucker simplification of a closed contour using geo's implementation.
///
/// The sequence is closed before simplifying so the closing edge is treated like
/// any other; the result is closed as well. A tolerance of 0 returns the input.
pub fn simplify_closed(points: &[[f64; 2]], tolerance: f64) -> Vec<[f64; 2]> {
    if tolerance <= 0.0 || points.len() < 3 {
        return points.to_vec();
    }

    let mut coords: Vec<Coord<f64>> = points.iter().map(|&[x, y]| Coord { x, y }).collect();
    if coords.first() != coords.last() {
        coords.push(coords[0]);
    }

    LineString::new(coords)
        .simplify(&tolerance)
        .coords()
        .map(|coord| [coord.x, coord.y])
        .collect()
}
