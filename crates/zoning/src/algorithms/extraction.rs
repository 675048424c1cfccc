use image::{GrayImage, imageops};
use imageproc::contours::{BorderType, find_contours};
use tracing::trace;

use crate::{
    algorithms::simplification::simplify_closed,
    types::{BinaryMask, Ring},
};

/// Traces the external boundary of every connected foreground region and
/// turns it into a simplified, closed ring.
#[derive(Debug, Clone, Default)]
pub struct ContourVectorizer {
    /// Douglas-Peucker tolerance in pixels; 0 keeps every traced vertex.
    pub simplify_tolerance: f64,
    /// Regions whose traced area is below this (in px²) are discarded before
    /// simplification. Zero-area regions are always discarded.
    pub min_area: f64,
}

/// Largest region of a mask, with measurements taken on the unsimplified contour.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedRegion {
    pub ring: Ring,
    pub area: f64,
    pub centroid: [f64; 2],
}

impl ContourVectorizer {
    pub fn new(simplify_tolerance: f64) -> Self {
        Self { simplify_tolerance, min_area: 0.0 }
    }

    /// Set the minimum area as a percentage of the full image area.
    pub fn with_min_area_percent(mut self, min_area_percent: f64, image_area: f64) -> Self {
        self.min_area = image_area * min_area_percent / 100.0;
        self
    }

    pub fn with_min_area(mut self, min_area: f64) -> Self {
        self.min_area = min_area;
        self
    }

    /// One ring per externally bounded region; holes are not traced.
    pub fn trace(&self, mask: &BinaryMask) -> Vec<Ring> {
        external_contours(mask)
            .into_iter()
            .filter(|points| {
                let area = polygon_area(points);
                area > 0.0 && area >= self.min_area
            })
            .filter_map(|points| self.to_ring(points))
            .collect()
    }

    /// The region with the largest traced area, if it reaches `min_area` and
    /// survives simplification.
    pub fn trace_largest(&self, mask: &BinaryMask) -> Option<TracedRegion> {
        let points = external_contours(mask)
            .into_iter()
            .map(|points| (polygon_area(&points), points))
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .filter(|(area, _)| *area > 0.0 && *area >= self.min_area)
            .map(|(_, points)| points)?;

        let area = polygon_area(&points);
        let centroid = polygon_centroid(&points);
        let ring = self.to_ring(points)?;
        Some(TracedRegion { ring, area, centroid })
    }

    fn to_ring(&self, mut points: Vec<[f64; 2]>) -> Option<Ring> {
        if self.simplify_tolerance > 0.0 {
            points = simplify_closed(&points, self.simplify_tolerance);
        }
        let ring = Ring::new(points);
        if ring.is_none() {
            trace!("dropping region with fewer than 3 distinct vertices");
        }
        ring
    }
}

/// Trace every region of `mask` into closed rings.
pub fn trace(mask: &BinaryMask, simplify_tolerance: f64) -> Vec<Ring> {
    ContourVectorizer::new(simplify_tolerance).trace(mask)
}

/// Border-following contours of outermost regions, one vertex per boundary pixel.
///
/// The mask is traced inside a one-pixel background frame: border following
/// only starts an outer border where the pixel to its left is background, so
/// regions touching column 0 would otherwise come back as holes.
pub fn external_contours(mask: &BinaryMask) -> Vec<Vec<[f64; 2]>> {
    let mut framed = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut framed, mask.as_image(), 1, 1);

    find_contours::<i32>(&framed)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .map(|contour| {
            contour.points
                .iter()
                .map(|p| [(p.x - 1) as f64, (p.y - 1) as f64])
                .collect()
        })
        .collect()
}

/// Unsigned shoelace area of a ring.
pub fn area(ring: &Ring) -> f64 {
    ring.area()
}

/// First-moment centroid of a ring.
pub fn centroid(ring: &Ring) -> [f64; 2] {
    ring.centroid()
}

/// Signed shoelace area of an implicitly closed point sequence.
pub fn signed_polygon_area(points: &[[f64; 2]]) -> f64 {
    edges(points)
        .map(|(a, b)| a[0] * b[1] - b[0] * a[1])
        .sum::<f64>()
        / 2.0
}

pub fn polygon_area(points: &[[f64; 2]]) -> f64 {
    signed_polygon_area(points).abs()
}

/// First-moment centroid of an implicitly closed point sequence, falling back
/// to the bounding-box center when the signed area is exactly zero.
pub fn polygon_centroid(points: &[[f64; 2]]) -> [f64; 2] {
    let signed_area = signed_polygon_area(points);
    if signed_area == 0.0 {
        let ([min_x, min_y], [max_x, max_y]) = bounds(points);
        return [(min_x + max_x) / 2.0, (min_y + max_y) / 2.0];
    }

    let (cx, cy) = edges(points).fold((0.0, 0.0), |(cx, cy), (a, b)| {
        let cross = a[0] * b[1] - b[0] * a[1];
        (cx + (a[0] + b[0]) * cross, cy + (a[1] + b[1]) * cross)
    });
    let factor = 1.0 / (6.0 * signed_area);
    [cx * factor, cy * factor]
}

pub fn bounds(points: &[[f64; 2]]) -> ([f64; 2], [f64; 2]) {
    points.iter().fold(
        ([f64::INFINITY, f64::INFINITY], [f64::NEG_INFINITY, f64::NEG_INFINITY]),
        |(min, max), &[x, y]| ([min[0].min(x), min[1].min(y)], [max[0].max(x), max[1].max(y)]),
    )
}

fn edges(points: &[[f64; 2]]) -> impl Iterator<Item = ([f64; 2], [f64; 2])> + '_ {
    let n = points.len();
    (0..n).map(move |i| (points[i], points[(i + 1) % n]))
}
