//! # Map Zoning Library
//!
//! Turns raster maps into numbered vector zones, and carves single regions
//! out of a map with a boundary-aware magic wand.
//!
//! ## Core Features
//!
//! - **Batch extraction**: CIELAB k-means segmentation, mask cleanup, contour
//!   tracing and Douglas-Peucker simplification
//! - **Stable zone ids**: zones are numbered top-to-bottom, left-to-right
//! - **Georeferencing**: bounding-box interpolation or control-point homography
//! - **Magic wand**: boundary-color or tolerance flood fill with overlap checks
//!   and an injectable OCR chain
//! - **GeoJSON Support**: export and reload zone collections
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zoning::{ExtractionPipeline, ExtractionSettings};
//!
//! let image = zoning::io::open_image("map.png")?;
//! let pipeline = ExtractionPipeline::from_settings(&ExtractionSettings::default())?;
//! let zones = pipeline.process(&image, None, None)?;
//! zones.save_geojson("zones.geojson")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Magic Wand
//!
//! ```rust,no_run
//! use zoning::{MagicWand, WandSettings};
//!
//! let image = zoning::io::open_image("map.png")?;
//! let wand = MagicWand::new(WandSettings::default())?;
//! let response = wand.select(&image, 120, 80, &[])?;
//! if response.success {
//!     println!("area {} text {:?}", response.area, response.ocr_text);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod types;
pub mod traits;
pub mod config;
pub mod cancel;
pub mod algorithms;
pub mod georef;
pub mod ocr;
pub mod pipeline;
pub mod wand;
pub mod io;
pub mod manager;
pub mod mcp;
pub mod typed_geojson;

// Re-exports for convenience
pub use error::{Result, ZoneError};
pub use types::{
    BinaryMask, CollectionMetadata, CropArea, LabelMap, PixelBox, RasterImage, Ring, Zone,
    ZoneCollection, ZonePolygon,
};
pub use traits::*;
pub use config::{ExtractionSettings, SelectionMode, WandSettings, load_config_file};
pub use cancel::CancelToken;
pub use georef::{ControlPoint, GeoBoundingBox, GeoTransformer, Georeference, Homography};
pub use ocr::{OcrChain, OcrEngine, RecognitionRequest, TextReading};
pub use pipeline::{ExtractionPipeline, builder::PipelineBuilder};
pub use wand::{MagicWand, WandFailure, WandResponse};
pub use manager::{ZoneCommand, ZoneCommandOutput, ZoneManager};

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Gray-lined plan: three rooms of different fill colors.
    fn create_test_map() -> RgbImage {
        RgbImage::from_fn(120, 90, |x, y| {
            let line = x < 2 || y < 2 || x >= 118 || y >= 88 || (58..60).contains(&x) || ((60..118).contains(&x) && (44..46).contains(&y));
            if line {
                Rgb([152, 152, 152])
            } else if x < 58 {
                Rgb([250, 240, 200])
            } else if y < 44 {
                Rgb([200, 230, 250])
            } else {
                Rgb([220, 250, 210])
            }
        })
    }

    #[test]
    fn test_extraction_end_to_end() {
        let settings = ExtractionSettings { color_clusters: 4, seed: Some(11), ..Default::default() };
        let pipeline = ExtractionPipeline::from_settings(&settings).expect("valid settings");
        let collection = pipeline.process(&create_test_map(), None, None).expect("should extract");

        assert!(collection.len() >= 3);
        for zone in &collection.zones {
            let ring = zone.polygon.exterior();
            assert_eq!(ring.points().first(), ring.points().last());
        }
        let geojson = collection.to_geojson().expect("should create GeoJSON");
        assert_eq!(geojson.features.len(), collection.len());
    }

    #[test]
    fn test_wand_then_overlap_end_to_end() {
        let map = create_test_map();
        let wand = MagicWand::new(WandSettings::default()).expect("valid settings");

        let first = wand.select(&map, 20, 20, &[]).expect("wand runs");
        assert!(first.success, "{:?}", first.error);
        let accepted = vec![first.zone_polygon().expect("polygon")];

        let second = wand.select(&map, 80, 20, &accepted).expect("wand runs");
        assert!(second.success, "{:?}", second.error);

        let repeat = wand.select(&map, 30, 60, &accepted).expect("wand runs");
        assert_eq!(repeat.failure, Some(WandFailure::Overlap));
    }
}
