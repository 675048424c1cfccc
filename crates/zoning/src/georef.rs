//! Pixel to geographic coordinate mapping.
//!
//! A [`Georeference`] is either an axis-aligned lat/lng rectangle spanning the
//! image or a set of control points from which a [`Homography`] is fitted.
//! Output vertices are `[lng, lat]`.

use nalgebra::{DMatrix, Matrix3, SMatrix, SVector, SVD};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;
use ts_rs::TS;

use crate::{
    error::{Result, ZoneError},
    types::{Zone, ZonePolygon},
};

pub const WGS84: &str = "EPSG:4326";
pub const PIXEL: &str = "pixel";

/// Lat/lng of the image's top-left and bottom-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct GeoBoundingBox {
    pub top_left_lat: f64,
    pub top_left_lng: f64,
    pub bottom_right_lat: f64,
    pub bottom_right_lng: f64,
}

/// One pixel position and the geographic position it corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct ControlPoint {
    pub image_x: f64,
    pub image_y: f64,
    pub lng: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Georeference {
    BoundingBox(GeoBoundingBox),
    /// At least four correspondences.
    ControlPoints(Vec<ControlPoint>),
}

impl Georeference {
    /// Pick the active form when a request may carry both; the rectangle wins.
    pub fn select(
        bounding_box: Option<GeoBoundingBox>,
        control_points: Option<Vec<ControlPoint>>,
    ) -> Option<Self> {
        match (bounding_box, control_points) {
            (Some(bbox), _) => Some(Self::BoundingBox(bbox)),
            (None, Some(points)) if !points.is_empty() => Some(Self::ControlPoints(points)),
            _ => None,
        }
    }
}

/// 3x3 projective transform from pixel space to `[lng, lat]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    /// Exact fit for four points, least-squares DLT for more.
    pub fn from_control_points(points: &[ControlPoint]) -> Result<Self> {
        if points.len() < 4 {
            return Err(degenerate(format!(
                "need at least 4 control points, got {}",
                points.len()
            )));
        }
        if points
            .iter()
            .any(|p| ![p.image_x, p.image_y, p.lng, p.lat].iter().all(|v| v.is_finite()))
        {
            return Err(degenerate("control points must be finite".to_string()));
        }

        let source: Vec<[f64; 2]> = points.iter().map(|p| [p.image_x, p.image_y]).collect();
        let target: Vec<[f64; 2]> = points.iter().map(|p| [p.lng, p.lat]).collect();
        let (source_norm, source_t) = normalize_points(&source)?;
        let (target_norm, target_t) = normalize_points(&target)?;

        let normalized = if points.len() == 4 {
            solve_exact(&source_norm, &target_norm)?
        } else {
            solve_dlt(&source_norm, &target_norm)?
        };

        // H = T_target^-1 * H_norm * T_source
        let target_inv = target_t
            .try_inverse()
            .ok_or_else(|| degenerate("normalization is singular".to_string()))?;
        let matrix = target_inv * normalized * source_t;

        let scale = matrix[(2, 2)];
        if scale.abs() < 1e-12 || !matrix.iter().all(|v| v.is_finite()) {
            return Err(degenerate("homography maps the origin to infinity".to_string()));
        }
        Ok(Self { matrix: matrix / scale })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn apply(&self, [x, y]: [f64; 2]) -> [f64; 2] {
        let m = &self.matrix;
        let w = m[(2, 0)] * x + m[(2, 1)] * y + m[(2, 2)];
        [
            (m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)]) / w,
            (m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)]) / w,
        ]
    }
}

/// Translate to the centroid and scale so the mean distance is sqrt(2).
fn normalize_points(points: &[[f64; 2]]) -> Result<(Vec<[f64; 2]>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    let (cx, cy) = (sx / n, sy / n);
    let mean_distance = points
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_distance < 1e-12 {
        return Err(degenerate("control points coincide".to_string()));
    }

    let scale = std::f64::consts::SQRT_2 / mean_distance;
    let normalized = points
        .iter()
        .map(|p| [(p[0] - cx) * scale, (p[1] - cy) * scale])
        .collect();
    #[rustfmt::skip]
    let transform = Matrix3::new(
        scale, 0.0, -cx * scale,
        0.0, scale, -cy * scale,
        0.0, 0.0, 1.0,
    );
    Ok((normalized, transform))
}

/// Solve the 8x8 system with `h22 = 1` from exactly four correspondences.
fn solve_exact(source: &[[f64; 2]], target: &[[f64; 2]]) -> Result<Matrix3<f64>> {
    for points in [source, target] {
        if has_collinear_triple(points) {
            return Err(degenerate("three of the four control points are collinear".to_string()));
        }
    }

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (i, (&[x, y], &[u, v])) in source.iter().zip(target).enumerate() {
        let r = 2 * i;
        a.row_mut(r).copy_from_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u]);
        a.row_mut(r + 1).copy_from_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -x * v, -y * v]);
        b[r] = u;
        b[r + 1] = v;
    }

    let h = a
        .lu()
        .solve(&b)
        .ok_or_else(|| degenerate("control point system is singular".to_string()))?;
    #[rustfmt::skip]
    let matrix = Matrix3::new(
        h[0], h[1], h[2],
        h[3], h[4], h[5],
        h[6], h[7], 1.0,
    );
    Ok(matrix)
}

/// Least-squares DLT: the right singular vector of the smallest singular value.
fn solve_dlt(source: &[[f64; 2]], target: &[[f64; 2]]) -> Result<Matrix3<f64>> {
    let n = source.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (&[x, y], &[u, v])) in source.iter().zip(target).enumerate() {
        let r = 2 * i;
        a.row_mut(r).copy_from_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, x * u, y * u, u]);
        a.row_mut(r + 1).copy_from_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, x * v, y * v, v]);
    }

    let svd = SVD::new(a, false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| degenerate("SVD did not converge".to_string()))?;

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&i, &j| svd.singular_values[i].total_cmp(&svd.singular_values[j]));
    let largest = svd.singular_values[order[order.len() - 1]];
    // A one-dimensional null space is required for a unique solution.
    if svd.singular_values[order[1]] <= 1e-9 * largest {
        return Err(degenerate("control points do not determine a homography".to_string()));
    }

    let h = v_t.row(order[0]);
    Ok(Matrix3::from_row_iterator(h.iter().copied()))
}

fn has_collinear_triple(points: &[[f64; 2]]) -> bool {
    let n = points.len();
    (0..n).any(|i| {
        (i + 1..n).any(|j| {
            (j + 1..n).any(|k| {
                let (a, b, c) = (points[i], points[j], points[k]);
                let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
                cross.abs() < 1e-9
            })
        })
    })
}

fn degenerate(message: String) -> ZoneError {
    ZoneError::DegenerateTransform(message)
}

#[derive(Debug, Clone)]
enum Projection {
    Identity,
    Linear { bbox: GeoBoundingBox, width: f64, height: f64 },
    Projective(Homography),
}

/// Maps every vertex produced in one request with a single projection.
#[derive(Debug, Clone)]
pub struct GeoTransformer {
    projection: Projection,
}

impl GeoTransformer {
    pub fn new(georeference: Option<&Georeference>, width: u32, height: u32) -> Result<Self> {
        let projection = match georeference {
            None => Projection::Identity,
            Some(Georeference::BoundingBox(bbox)) => Projection::Linear {
                bbox: *bbox,
                width: width as f64,
                height: height as f64,
            },
            Some(Georeference::ControlPoints(points)) => {
                let homography = Homography::from_control_points(points)?;
                debug!(points = points.len(), "fitted homography");
                Projection::Projective(homography)
            }
        };
        Ok(Self { projection })
    }

    pub fn is_georeferenced(&self) -> bool {
        !matches!(self.projection, Projection::Identity)
    }

    pub fn coordinate_system(&self) -> &'static str {
        if self.is_georeferenced() { WGS84 } else { PIXEL }
    }

    pub fn apply(&self, point: [f64; 2]) -> [f64; 2] {
        match &self.projection {
            Projection::Identity => point,
            Projection::Linear { bbox, width, height } => {
                let nx = point[0] / width;
                let ny = point[1] / height;
                [
                    bbox.top_left_lng + nx * (bbox.bottom_right_lng - bbox.top_left_lng),
                    bbox.top_left_lat + ny * (bbox.bottom_right_lat - bbox.top_left_lat),
                ]
            }
            Projection::Projective(homography) => homography.apply(point),
        }
    }

    pub fn transform_polygon(&self, polygon: &ZonePolygon) -> Result<ZonePolygon> {
        let mapped = polygon.map_points(|p| self.apply(p));
        let finite = mapped
            .rings()
            .iter()
            .flat_map(|ring| ring.points())
            .all(|[x, y]| x.is_finite() && y.is_finite());
        if !finite {
            return Err(degenerate("vertex projects to infinity".to_string()));
        }
        Ok(mapped)
    }

    /// Replace every zone's vertices. Identifiers, order and pixel centroids are kept.
    pub fn transform_zones(&self, zones: Vec<Zone>) -> Result<Vec<Zone>> {
        zones
            .into_iter()
            .map(|zone| {
                Ok(Zone {
                    polygon: self.transform_polygon(&zone.polygon)?,
                    ..zone
                })
            })
            .collect()
    }
}

/// Map `polygons` from pixel space using `georeference`, or return them
/// unchanged when none is given.
pub fn transform(
    polygons: &[ZonePolygon],
    width: u32,
    height: u32,
    georeference: Option<&Georeference>,
) -> Result<Vec<ZonePolygon>> {
    let transformer = GeoTransformer::new(georeference, width, height)?;
    polygons.iter().map(|p| transformer.transform_polygon(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ring;

    fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64) -> ZonePolygon {
        ZonePolygon::new(Ring::new(vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]]).unwrap())
    }

    fn cp(image_x: f64, image_y: f64, lng: f64, lat: f64) -> ControlPoint {
        ControlPoint { image_x, image_y, lng, lat }
    }

    fn assert_near(actual: [f64; 2], expected: [f64; 2], tolerance: f64) {
        assert!(
            (actual[0] - expected[0]).abs() < tolerance && (actual[1] - expected[1]).abs() < tolerance,
            "{:?} != {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn no_georeference_is_identity() {
        let polygons = vec![rectangle(1.0, 2.0, 3.0, 4.0)];
        assert_eq!(transform(&polygons, 10, 10, None).unwrap(), polygons);
        let transformer = GeoTransformer::new(None, 10, 10).unwrap();
        assert_eq!(transformer.coordinate_system(), PIXEL);
    }

    #[test]
    fn bounding_box_interpolates_each_axis() {
        let bbox = GeoBoundingBox {
            top_left_lat: 40.0,
            top_left_lng: -75.0,
            bottom_right_lat: 39.0,
            bottom_right_lng: -74.0,
        };
        let transformer = GeoTransformer::new(Some(&Georeference::BoundingBox(bbox)), 200, 100).unwrap();
        assert_eq!(transformer.coordinate_system(), WGS84);
        assert_near(transformer.apply([0.0, 0.0]), [-75.0, 40.0], 1e-12);
        assert_near(transformer.apply([200.0, 100.0]), [-74.0, 39.0], 1e-12);
        assert_near(transformer.apply([50.0, 50.0]), [-74.75, 39.5], 1e-12);
    }

    #[test]
    fn four_control_points_reproduce_exactly() {
        let points = vec![
            cp(0.0, 0.0, -122.52, 37.81),
            cp(800.0, 0.0, -122.35, 37.80),
            cp(820.0, 600.0, -122.36, 37.70),
            cp(-10.0, 590.0, -122.51, 37.71),
        ];
        let homography = Homography::from_control_points(&points).unwrap();
        for p in &points {
            assert_near(homography.apply([p.image_x, p.image_y]), [p.lng, p.lat], 1e-9);
        }

        let polygon = ZonePolygon::new(
            Ring::new(points.iter().map(|p| [p.image_x, p.image_y]).collect()).unwrap(),
        );
        let mapped = transform(
            &[polygon],
            800,
            600,
            Some(&Georeference::ControlPoints(points.clone())),
        )
        .unwrap();
        for (vertex, p) in mapped[0].exterior().open_points().iter().zip(&points) {
            assert_near(*vertex, [p.lng, p.lat], 1e-9);
        }
    }

    #[test]
    fn many_control_points_fit_least_squares() {
        #[rustfmt::skip]
        let truth = Homography { matrix: Matrix3::new(
            0.001, 0.0002, -122.5,
            0.0001, -0.001, 37.8,
            1e-5, 2e-5, 1.0,
        ) };
        let pixels = [
            [0.0, 0.0], [1000.0, 0.0], [1000.0, 800.0], [0.0, 800.0],
            [500.0, 400.0], [250.0, 600.0],
        ];
        let points: Vec<_> = pixels
            .iter()
            .map(|&p| {
                let [lng, lat] = truth.apply(p);
                cp(p[0], p[1], lng, lat)
            })
            .collect();

        let fitted = Homography::from_control_points(&points).unwrap();
        for p in pixels.iter().chain(&[[123.0, 456.0]]) {
            assert_near(fitted.apply(*p), truth.apply(*p), 1e-7);
        }
    }

    #[test]
    fn degenerate_control_points_are_fatal() {
        let too_few = vec![cp(0.0, 0.0, 0.0, 0.0), cp(1.0, 0.0, 1.0, 0.0), cp(0.0, 1.0, 0.0, 1.0)];
        assert!(matches!(
            Homography::from_control_points(&too_few),
            Err(ZoneError::DegenerateTransform(_))
        ));

        let collinear_four = vec![
            cp(0.0, 0.0, 0.0, 0.0),
            cp(1.0, 1.0, 1.0, 0.0),
            cp(2.0, 2.0, 1.0, 1.0),
            cp(0.0, 5.0, 0.0, 1.0),
        ];
        assert!(Homography::from_control_points(&collinear_four).is_err());

        let collinear_many: Vec<_> = (0..6)
            .map(|i| cp(i as f64 * 10.0, i as f64 * 5.0, i as f64, i as f64 * 2.0))
            .collect();
        assert!(matches!(
            transform(&[rectangle(0.0, 0.0, 1.0, 1.0)], 10, 10, Some(&Georeference::ControlPoints(collinear_many))),
            Err(ZoneError::DegenerateTransform(_))
        ));
    }

    #[test]
    fn bounding_box_takes_precedence() {
        let bbox = GeoBoundingBox {
            top_left_lat: 1.0,
            top_left_lng: 0.0,
            bottom_right_lat: 0.0,
            bottom_right_lng: 1.0,
        };
        let selected = Georeference::select(Some(bbox), Some(vec![cp(0.0, 0.0, 0.0, 0.0)]));
        assert_eq!(selected, Some(Georeference::BoundingBox(bbox)));
        assert_eq!(Georeference::select(None, Some(Vec::new())), None);
    }

    #[test]
    fn zones_keep_identity() {
        let zones = crate::algorithms::assignment::assign(vec![rectangle(0.0, 0.0, 10.0, 10.0)]);
        let bbox = GeoBoundingBox {
            top_left_lat: 10.0,
            top_left_lng: 0.0,
            bottom_right_lat: 0.0,
            bottom_right_lng: 10.0,
        };
        let transformer = GeoTransformer::new(Some(&Georeference::BoundingBox(bbox)), 10, 10).unwrap();
        let mapped = transformer.transform_zones(zones.clone()).unwrap();
        assert_eq!(mapped[0].zone_id, zones[0].zone_id);
        assert_eq!(mapped[0].centroid, zones[0].centroid);
        assert_near(mapped[0].polygon.exterior().points()[2], [10.0, 0.0], 1e-12);
    }
}
