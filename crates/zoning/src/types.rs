use std::collections::HashSet;

use geo_types::{Coord, LineString};
use image::{GrayImage, Luma};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::algorithms::extraction::{bounds, polygon_centroid, signed_polygon_area};

/// Read-only 3-channel input raster.
pub type RasterImage = image::RgbImage;

/// Boolean grid stored as a grayscale image (0 = off, 255 = on) so it can be
/// handed to `imageproc` without conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    image: GrayImage,
}

impl BinaryMask {
    pub const ON: u8 = 255;

    /// All-off mask of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { image: GrayImage::new(width, height) }
    }

    /// Wrap a grayscale image; any non-zero sample counts as on.
    pub fn from_image(mut image: GrayImage) -> Self {
        for pixel in image.pixels_mut() {
            if pixel[0] != 0 {
                pixel[0] = Self::ON;
            }
        }
        Self { image }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let image = GrayImage::from_fn(width, height, |x, y| {
            Luma([if f(x, y) { Self::ON } else { 0 }])
        });
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y)[0] != 0
    }

    pub(crate) fn set(&mut self, x: u32, y: u32, on: bool) {
        self.image.put_pixel(x, y, Luma([if on { Self::ON } else { 0 }]));
    }

    /// Number of on pixels.
    pub fn count(&self) -> usize {
        self.image.pixels().filter(|p| p[0] != 0).count()
    }

    /// True when no pixel is on.
    pub fn is_empty(&self) -> bool {
        self.image.pixels().all(|p| p[0] == 0)
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }

    /// Tight inclusive bounding box of the on pixels, `PixelBox::EMPTY` when none.
    pub fn bounding_box(&self) -> PixelBox {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in self.image.enumerate_pixels() {
            if pixel[0] == 0 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((min_x, min_y, max_x, max_y)) => {
                    (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
                }
            });
        }
        match bounds {
            Some((min_x, min_y, max_x, max_y)) => PixelBox::from_extent(min_x, min_y, max_x, max_y),
            None => PixelBox::EMPTY,
        }
    }
}

/// Per-pixel cluster ids produced by the color segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    width: u32,
    height: u32,
    k: usize,
    labels: Vec<u16>,
}

impl LabelMap {
    pub fn new(width: u32, height: u32, k: usize, labels: Vec<u16>) -> Self {
        debug_assert_eq!(labels.len(), width as usize * height as usize);
        Self { width, height, k, labels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of clusters requested; every label is below this value.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn get(&self, x: u32, y: u32) -> u16 {
        self.labels[(y * self.width + x) as usize]
    }

    pub fn labels(&self) -> &[u16] {
        &self.labels
    }

    /// Labels that occur at least once, ascending.
    pub fn present_labels(&self) -> Vec<u16> {
        let mut seen = vec![false; self.k.max(1)];
        for &label in &self.labels {
            if let Some(slot) = seen.get_mut(label as usize) {
                *slot = true;
            }
        }
        seen.iter()
            .enumerate()
            .filter(|(_, present)| **present)
            .map(|(label, _)| label as u16)
            .collect()
    }

    /// Mask of every pixel carrying `label`.
    pub fn mask_for(&self, label: u16) -> BinaryMask {
        BinaryMask::from_fn(self.width, self.height, |x, y| self.get(x, y) == label)
    }
}

/// Inclusive pixel-space bounding box. The all-zero box means "no selection".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBox {
    pub const EMPTY: PixelBox = PixelBox { x: 0, y: 0, width: 0, height: 0 };

    pub fn from_extent(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

/// Closed loop of points: first point equals last, and at least three distinct
/// points precede the closing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Ring {
    points: Vec<[f64; 2]>,
}

impl Ring {
    /// Build a ring, appending the first point when the sequence is open.
    /// Returns `None` when fewer than three distinct points are present.
    pub fn new(mut points: Vec<[f64; 2]>) -> Option<Self> {
        if distinct_points(&points) < 3 {
            return None;
        }
        if points.first() != points.last() {
            let first = points[0];
            points.push(first);
        }
        Some(Self { points })
    }

    /// Points including the closing duplicate.
    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    /// Points without the closing duplicate.
    pub fn open_points(&self) -> &[[f64; 2]] {
        &self.points[..self.points.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Shoelace area, positive for counter-clockwise rings in a y-up frame.
    pub fn signed_area(&self) -> f64 {
        signed_polygon_area(&self.points)
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// First-moment centroid; bounding-box center when the signed area is exactly zero.
    pub fn centroid(&self) -> [f64; 2] {
        polygon_centroid(&self.points)
    }

    pub fn bounding_box(&self) -> ([f64; 2], [f64; 2]) {
        bounds(&self.points)
    }

    /// Apply `f` to every vertex, keeping the ring closed.
    pub fn map_points(&self, mut f: impl FnMut([f64; 2]) -> [f64; 2]) -> Self {
        Self { points: self.points.iter().map(|&p| f(p)).collect() }
    }

    pub fn to_line_string(&self) -> LineString<f64> {
        LineString::new(self.points.iter().map(|&[x, y]| Coord { x, y }).collect())
    }
}

impl TryFrom<Vec<[f64; 2]>> for Ring {
    type Error = String;

    fn try_from(points: Vec<[f64; 2]>) -> std::result::Result<Self, Self::Error> {
        Ring::new(points).ok_or_else(|| "ring needs at least 3 distinct points".to_string())
    }
}

impl From<Ring> for Vec<[f64; 2]> {
    fn from(ring: Ring) -> Self {
        ring.points
    }
}

fn distinct_points(points: &[[f64; 2]]) -> usize {
    points
        .iter()
        .map(|&[x, y]| (x.to_bits(), y.to_bits()))
        .collect::<HashSet<_>>()
        .len()
}

/// Polygon made of rings; the first ring is the exterior. Holes are filled
/// upstream, so extracted polygons carry a single ring.
///
/// Always holds at least one ring, including when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolygonRings")]
pub struct ZonePolygon {
    rings: Vec<Ring>,
}

#[derive(Deserialize)]
struct PolygonRings {
    rings: Vec<Ring>,
}

impl TryFrom<PolygonRings> for ZonePolygon {
    type Error = String;

    fn try_from(raw: PolygonRings) -> std::result::Result<Self, Self::Error> {
        ZonePolygon::from_rings(raw.rings).ok_or_else(|| "polygon needs an exterior ring".to_string())
    }
}

impl ZonePolygon {
    pub fn new(exterior: Ring) -> Self {
        Self { rings: vec![exterior] }
    }

    /// Exterior first, then holes. `None` when `rings` is empty.
    pub fn from_rings(rings: Vec<Ring>) -> Option<Self> {
        (!rings.is_empty()).then_some(Self { rings })
    }

    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub fn exterior(&self) -> &Ring {
        &self.rings[0]
    }

    pub fn area(&self) -> f64 {
        self.exterior().area()
    }

    pub fn centroid(&self) -> [f64; 2] {
        self.exterior().centroid()
    }

    /// GeoJSON-style nested coordinate arrays.
    pub fn coordinates(&self) -> Vec<Vec<Vec<f64>>> {
        self.rings
            .iter()
            .map(|ring| ring.points().iter().map(|&[x, y]| vec![x, y]).collect())
            .collect()
    }

    pub fn map_points(&self, mut f: impl FnMut([f64; 2]) -> [f64; 2]) -> Self {
        Self {
            rings: self.rings.iter().map(|ring| ring.map_points(&mut f)).collect(),
        }
    }
}

/// A polygon with its position-derived identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// 1-based position in the top-to-bottom, left-to-right ordering.
    pub sequence: usize,
    pub zone_id: String,
    pub polygon: ZonePolygon,
    /// Pixel-space centroid the ordering was computed from.
    pub centroid: [f64; 2],
    /// Pixel-space area, measured before any georeferencing.
    pub area: f64,
}

impl Zone {
    pub fn format_id(sequence: usize) -> String {
        format!("ZONE_{:04}", sequence)
    }
}

/// Pixel rectangle cut out of the input before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct CropArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropArea {
    /// True when the area is non-empty and lies inside a `width` x `height` image.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        self.width > 0
            && self.height > 0
            && right.is_some_and(|r| r <= width)
            && bottom.is_some_and(|b| b <= height)
    }
}

/// Dimensions and coordinate system of an extraction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct CollectionMetadata {
    /// Size of the processed (possibly cropped) image.
    pub image_width: u32,
    pub image_height: u32,
    /// Size of the image before cropping.
    pub original_width: u32,
    pub original_height: u32,
    pub georeferenced: bool,
    /// `"EPSG:4326"` when georeferenced, `"pixel"` otherwise.
    pub coordinate_system: String,
}

/// Ordered zones produced by one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneCollection {
    pub zones: Vec<Zone>,
    pub metadata: CollectionMetadata,
}

impl ZoneCollection {
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.zone_id == zone_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Ring {
        Ring::new(vec![
            [x0, y0],
            [x0 + size, y0],
            [x0 + size, y0 + size],
            [x0, y0 + size],
        ])
        .expect("square is a valid ring")
    }

    #[test]
    fn ring_is_closed_on_construction() {
        let ring = square(0.0, 0.0, 4.0);
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.points()[0], ring.points()[4]);
        assert_eq!(ring.open_points().len(), 4);
    }

    #[test]
    fn ring_rejects_fewer_than_three_distinct_points() {
        assert!(Ring::new(vec![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]]).is_none());
        assert!(Ring::new(vec![[0.0, 0.0], [0.0, 0.0], [0.0, 0.0], [0.0, 0.0]]).is_none());
    }

    #[test]
    fn area_and_centroid_of_square() {
        let ring = square(2.0, 4.0, 10.0);
        assert_eq!(ring.area(), 100.0);
        let [cx, cy] = ring.centroid();
        assert!((cx - 7.0).abs() < 1e-9 && (cy - 9.0).abs() < 1e-9);
    }

    #[test]
    fn centroid_is_orientation_independent() {
        let ring = Ring::new(vec![[0.0, 0.0], [0.0, 6.0], [6.0, 6.0], [6.0, 0.0]]).unwrap();
        assert!(ring.signed_area() < 0.0);
        let [cx, cy] = ring.centroid();
        assert!((cx - 3.0).abs() < 1e-9 && (cy - 3.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_sliver_falls_back_to_bbox_center() {
        let ring = Ring::new(vec![[0.0, 0.0], [5.0, 0.0], [10.0, 0.0], [5.0, 0.0]]).unwrap();
        assert_eq!(ring.signed_area(), 0.0);
        assert_eq!(ring.centroid(), [5.0, 0.0]);
    }

    #[test]
    fn mask_bounding_box_is_inclusive() {
        let mask = BinaryMask::from_fn(10, 10, |x, y| (2..=5).contains(&x) && (3..=4).contains(&y));
        assert_eq!(mask.count(), 8);
        assert_eq!(mask.bounding_box(), PixelBox { x: 2, y: 3, width: 4, height: 2 });
        assert!(BinaryMask::new(4, 4).bounding_box().is_empty());
    }

    #[test]
    fn label_map_masks() {
        let labels = vec![0, 0, 2, 2];
        let map = LabelMap::new(2, 2, 3, labels);
        assert_eq!(map.present_labels(), vec![0, 2]);
        let mask = map.mask_for(2);
        assert!(!mask.get(0, 0));
        assert!(mask.get(1, 1));
    }

    #[test]
    fn crop_area_bounds() {
        let crop = CropArea { x: 2, y: 2, width: 8, height: 8 };
        assert!(crop.fits(10, 10));
        assert!(!crop.fits(9, 10));
        assert!(!CropArea { x: 0, y: 0, width: 0, height: 4 }.fits(10, 10));
        assert!(!CropArea { x: u32::MAX, y: 0, width: 2, height: 2 }.fits(10, 10));
    }

    #[test]
    fn polygon_always_has_an_exterior() {
        assert!(ZonePolygon::from_rings(Vec::new()).is_none());
        assert!(serde_json::from_str::<ZonePolygon>(r#"{"rings": []}"#).is_err());

        let polygon: ZonePolygon =
            serde_json::from_str(r#"{"rings": [[[0,0],[4,0],[4,4],[0,4]]]}"#).unwrap();
        assert_eq!(polygon.rings().len(), 1);
        assert_eq!(polygon.area(), 16.0);
        let json = serde_json::to_string(&polygon).unwrap();
        assert_eq!(serde_json::from_str::<ZonePolygon>(&json).unwrap(), polygon);
    }

    #[test]
    fn ring_deserialization_enforces_invariant() {
        let ok: Ring = serde_json::from_str("[[0,0],[1,0],[1,1]]").unwrap();
        assert_eq!(ok.len(), 4);
        assert!(serde_json::from_str::<Ring>("[[0,0],[1,1]]").is_err());
    }
}
