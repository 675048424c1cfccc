use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, Value};

use crate::{
    error::{Result, ZoneError},
    typed_geojson::{TypedFeature, ZoneProperties},
    types::{CollectionMetadata, Ring, Zone, ZoneCollection, ZonePolygon},
};

const METADATA_KEY: &str = "metadata";

impl Zone {
    fn properties(&self) -> ZoneProperties {
        ZoneProperties {
            zone_id: self.zone_id.clone(),
            sequence: self.sequence,
            area: self.area,
            centroid: self.centroid,
        }
    }

    fn geometry(&self) -> Geometry {
        Geometry::new(Value::Polygon(self.polygon.coordinates()))
    }
}

impl ZoneCollection {
    fn foreign_members(&self) -> Result<geojson::JsonObject> {
        let mut foreign_members = serde_json::Map::new();
        foreign_members.insert(METADATA_KEY.to_string(), serde_json::to_value(&self.metadata)?);
        Ok(foreign_members)
    }

    /// Features in zone order; each carries `zone_id` both as the feature id
    /// and in its properties.
    pub fn to_geojson(&self) -> Result<FeatureCollection> {
        let features = self
            .zones
            .iter()
            .map(|zone| {
                let properties = match serde_json::to_value(zone.properties())? {
                    serde_json::Value::Object(map) => Some(map),
                    _ => None,
                };
                Ok(Feature {
                    bbox: None,
                    geometry: Some(zone.geometry()),
                    id: Some(geojson::feature::Id::String(zone.zone_id.clone())),
                    properties,
                    foreign_members: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(self.foreign_members()?),
        })
    }

    /// Export to GeoJSON and serialize to JSON string
    pub fn to_geojson_string(&self) -> Result<String> {
        let geojson = self.to_geojson()?;
        Ok(serde_json::to_string_pretty(&geojson)?)
    }

    pub fn save_geojson(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_geojson_string()?)?;
        Ok(())
    }

    pub fn from_geojson_file(path: impl AsRef<Path>) -> Result<Self> {
        let geojson_str = std::fs::read_to_string(path)?;
        Self::from_geojson_string(&geojson_str)
    }

    /// Rebuild a collection written by [`Self::to_geojson_string`].
    pub fn from_geojson_string(geojson_str: &str) -> Result<Self> {
        let geojson: FeatureCollection = geojson_str.parse()?;

        let metadata: CollectionMetadata = geojson
            .foreign_members
            .as_ref()
            .and_then(|members| members.get(METADATA_KEY))
            .cloned()
            .ok_or_else(|| invalid("missing metadata"))
            .and_then(|value| Ok(serde_json::from_value(value)?))?;

        let zones = geojson
            .features
            .into_iter()
            .map(zone_from_feature)
            .collect::<Result<Vec<_>>>()?;

        Ok(ZoneCollection { zones, metadata })
    }
}

fn zone_from_feature(feature: Feature) -> Result<Zone> {
    let typed = TypedFeature::<ZoneProperties>::from_feature(feature);
    let properties = typed
        .properties()
        .ok_or_else(|| invalid("feature without zone properties"))?;

    let coordinates = match typed.feature.geometry.map(|geometry| geometry.value) {
        Some(Value::Polygon(coordinates)) if !coordinates.is_empty() => coordinates,
        _ => return Err(invalid(&format!("{} is not a polygon", properties.zone_id))),
    };

    let rings = coordinates
        .into_iter()
        .map(|ring| {
            let points = ring
                .iter()
                .filter(|position| position.len() >= 2)
                .map(|position| [position[0], position[1]])
                .collect();
            Ring::new(points).ok_or_else(|| invalid(&format!("degenerate ring in {}", properties.zone_id)))
        })
        .collect::<Result<Vec<_>>>()?;
    let polygon = ZonePolygon::from_rings(rings)
        .ok_or_else(|| invalid(&format!("polygon without rings in {}", properties.zone_id)))?;

    Ok(Zone {
        sequence: properties.sequence,
        zone_id: properties.zone_id,
        polygon,
        centroid: properties.centroid,
        area: properties.area,
    })
}

fn invalid(message: &str) -> ZoneError {
    ZoneError::InvalidGeoJson(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::assignment::assign;

    fn collection() -> ZoneCollection {
        let squares = [(0.0, 0.0), (20.0, 0.0), (0.0, 20.0)]
            .into_iter()
            .map(|(x, y)| {
                ZonePolygon::new(
                    Ring::new(vec![[x, y], [x + 10.0, y], [x + 10.0, y + 10.0], [x, y + 10.0]]).unwrap(),
                )
            })
            .collect();
        ZoneCollection {
            zones: assign(squares),
            metadata: CollectionMetadata {
                image_width: 40,
                image_height: 40,
                original_width: 40,
                original_height: 40,
                georeferenced: false,
                coordinate_system: "pixel".to_string(),
            },
        }
    }

    #[test]
    fn features_carry_zone_ids_and_metadata() {
        let geojson = collection().to_geojson().unwrap();
        assert_eq!(geojson.features.len(), 3);

        let first = &geojson.features[0];
        let properties = first.properties.as_ref().unwrap();
        assert_eq!(properties["zone_id"], "ZONE_0001");
        assert_eq!(properties["area"], 100.0);
        assert_eq!(first.id, Some(geojson::feature::Id::String("ZONE_0001".to_string())));

        let metadata = &geojson.foreign_members.as_ref().unwrap()["metadata"];
        assert_eq!(metadata["coordinate_system"], "pixel");
        assert_eq!(metadata["georeferenced"], false);
        assert_eq!(metadata["original_width"], 40);
    }

    #[test]
    fn string_export_reloads() {
        let original = collection();
        let reloaded = ZoneCollection::from_geojson_string(&original.to_geojson_string().unwrap()).unwrap();
        assert_eq!(reloaded, original);
        assert_eq!(reloaded.get("ZONE_0002").unwrap().sequence, 2);
    }

    #[test]
    fn feature_without_zone_properties_is_rejected() {
        let mut geojson = collection().to_geojson().unwrap();
        geojson.features[1].properties = None;
        let err = ZoneCollection::from_geojson_string(&geojson.to_string()).unwrap_err();
        assert!(matches!(err, ZoneError::InvalidGeoJson(_)));
    }

    #[test]
    fn missing_metadata_is_rejected() {
        let bare = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(
            ZoneCollection::from_geojson_string(bare),
            Err(ZoneError::InvalidGeoJson(_))
        ));
    }
}
