use std::panic::{self, AssertUnwindSafe};

use geo::{Area, BooleanOps};
use geo_types::{MultiPolygon, Polygon};
use tracing::warn;

use crate::types::{Ring, ZonePolygon};

/// True when `candidate` shares a positive area with the exterior of any of
/// `existing`. Touching edges or corners do not count.
///
/// Rings are repaired by a unary union before comparison, which resolves
/// self-intersections. If repair or intersection fails, the candidate is
/// reported as not overlapping.
pub fn overlaps(candidate: &Ring, existing: &[ZonePolygon]) -> bool {
    if existing.is_empty() {
        return false;
    }
    if !is_finite(candidate) {
        warn!("candidate ring has non-finite coordinates, skipping overlap check");
        return false;
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let candidate = repair(candidate);
        existing
            .iter()
            .map(ZonePolygon::exterior)
            .filter(|ring| is_finite(ring))
            .any(|ring| candidate.intersection(&repair(ring)).unsigned_area() > 0.0)
    }));

    result.unwrap_or_else(|_| {
        warn!("overlap check failed, treating candidate as non-overlapping");
        false
    })
}

fn repair(ring: &Ring) -> MultiPolygon<f64> {
    let polygon = MultiPolygon::new(vec![Polygon::new(ring.to_line_string(), vec![])]);
    polygon.union(&MultiPolygon::<f64>::new(vec![]))
}

fn is_finite(ring: &Ring) -> bool {
    ring.points().iter().all(|[x, y]| x.is_finite() && y.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Ring {
        Ring::new(vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]]).unwrap()
    }

    fn polygon(ring: Ring) -> ZonePolygon {
        ZonePolygon::new(ring)
    }

    #[test]
    fn overlapping_squares() {
        let existing = [polygon(square(0.0, 0.0, 10.0, 10.0))];
        assert!(overlaps(&square(5.0, 5.0, 15.0, 15.0), &existing));
    }

    #[test]
    fn disjoint_squares() {
        let existing = [polygon(square(0.0, 0.0, 10.0, 10.0))];
        assert!(!overlaps(&square(20.0, 20.0, 30.0, 30.0), &existing));
    }

    #[test]
    fn shared_edge_is_not_overlap() {
        let existing = [polygon(square(0.0, 0.0, 10.0, 10.0))];
        assert!(!overlaps(&square(10.0, 0.0, 20.0, 10.0), &existing));
    }

    #[test]
    fn self_intersecting_candidate_is_repaired() {
        // bowtie whose right lobe covers (7,4)-(9,6)
        let bowtie = Ring::new(vec![[0.0, 0.0], [10.0, 10.0], [10.0, 0.0], [0.0, 10.0]]).unwrap();
        let inside_lobe = [polygon(square(7.0, 4.0, 9.0, 6.0))];
        assert!(overlaps(&bowtie, &inside_lobe));

        let far_away = [polygon(square(50.0, 50.0, 60.0, 60.0))];
        assert!(!overlaps(&bowtie, &far_away));
    }

    #[test]
    fn any_existing_polygon_can_trigger() {
        let existing = [
            polygon(square(100.0, 100.0, 110.0, 110.0)),
            polygon(square(0.0, 0.0, 10.0, 10.0)),
        ];
        assert!(overlaps(&square(2.0, 2.0, 4.0, 4.0), &existing));
        assert!(!overlaps(&square(2.0, 2.0, 4.0, 4.0), &[]));
    }

    #[test]
    fn non_finite_input_is_permissive() {
        let bad = Ring::new(vec![[0.0, 0.0], [f64::NAN, 1.0], [1.0, 1.0]]).unwrap();
        let existing = [polygon(square(0.0, 0.0, 10.0, 10.0))];
        assert!(!overlaps(&bad, &existing));
    }
}
