use tracing::debug;

use crate::types::{Zone, ZonePolygon};

/// Order polygons top-to-bottom then left-to-right by exterior centroid and
/// number them from 1.
///
/// The sort is stable: polygons with identical centroids keep their input order.
pub fn assign(polygons: Vec<ZonePolygon>) -> Vec<Zone> {
    let mut keyed: Vec<([f64; 2], ZonePolygon)> = polygons
        .into_iter()
        .map(|polygon| (polygon.centroid(), polygon))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| a[1].total_cmp(&b[1]).then(a[0].total_cmp(&b[0])));

    let zones: Vec<Zone> = keyed
        .into_iter()
        .enumerate()
        .map(|(index, (centroid, polygon))| {
            let sequence = index + 1;
            Zone {
                sequence,
                zone_id: Zone::format_id(sequence),
                area: polygon.area(),
                polygon,
                centroid,
            }
        })
        .collect();

    debug!(zones = zones.len(), "assigned zone ids");
    zones
}
