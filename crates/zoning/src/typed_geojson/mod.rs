use std::marker::PhantomData;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use schemars::JsonSchema;

/// Properties for zone features
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS, JsonSchema)]
#[ts(export)]
#[schemars(description = "Properties for zone features")]
pub struct ZoneProperties {
    #[schemars(description = "Position-derived identifier, e.g. ZONE_0001")]
    pub zone_id: String,
    #[schemars(description = "1-based position in top-to-bottom, left-to-right order")]
    pub sequence: usize,
    #[schemars(description = "Area of the zone in square pixels")]
    pub area: f64,
    #[schemars(description = "Pixel-space centroid used for ordering")]
    pub centroid: [f64; 2],
}

/// A typed GeoJSON Feature that is generic over its properties.
#[derive(Serialize, Deserialize, Debug)]
pub struct TypedFeature<P> {
    #[serde(flatten)]
    pub feature: geojson::Feature,
    #[serde(skip)]
    _properties: PhantomData<P>,
}

impl<P> TypedFeature<P>
where
    for<'de> P: Serialize + Deserialize<'de>,
{
    /// Wrap an untyped feature; properties are checked lazily by [`Self::properties`].
    pub fn from_feature(feature: geojson::Feature) -> Self {
        Self {
            feature,
            _properties: PhantomData,
        }
    }

    /// Tries to access the typed properties of the feature.
    pub fn properties(&self) -> Option<P> {
        self.feature.properties.as_ref().and_then(|p| {
            serde_json::from_value(serde_json::Value::Object(p.clone())).ok()
        })
    }
}
