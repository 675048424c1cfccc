use std::path::Path;

use image::RgbImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::warn;

use crate::{
    cancel::CancelToken,
    config::{ExtractionSettings, WandSettings},
    error::{Result, ZoneError},
    georef::Georeference,
    io,
    ocr::OcrChain,
    pipeline::ExtractionPipeline,
    types::{CropArea, Ring, ZoneCollection, ZonePolygon},
    wand::{MagicWand, WandResponse},
};

#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params")]
#[strum(serialize_all = "snake_case")]
pub enum ZoneCommand {
    /// Extract numbered zones from the whole loaded image
    #[serde(rename = "extract_zones")]
    ExtractZones {
        #[serde(default)]
        settings: ExtractionSettings,
        #[serde(default)]
        crop: Option<CropArea>,
        #[serde(default)]
        georeference: Option<Georeference>,
    },

    /// Select one region with a flood fill from a clicked pixel
    #[serde(rename = "magic_wand")]
    MagicWand {
        x: i64,
        y: i64,
        #[serde(default)]
        settings: WandSettings,
        /// Previously accepted polygons as rings of `[x, y]`, exterior first
        #[serde(default)]
        existing_polygons: Vec<Vec<Vec<[f64; 2]>>>,
    },
}

impl Default for ZoneCommand {
    fn default() -> Self {
        Self::ExtractZones {
            settings: ExtractionSettings::default(),
            crop: None,
            georeference: None,
        }
    }
}

impl ZoneCommand {
    /// Get the JSON schema for all commands
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ZoneCommand)
    }

    /// Get a list of all available command names
    pub fn command_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ExtractZones { .. } => {
                "Segment the image by color and vectorize every region into numbered zones"
            }
            Self::MagicWand { .. } => {
                "Flood-fill from a clicked pixel and return the enclosing polygon with OCR text"
            }
        }
    }

    /// Get parameter requirements for the command
    pub fn parameters_info(&self) -> Vec<(&'static str, &'static str, bool)> {
        match self {
            Self::ExtractZones { .. } => vec![
                ("settings", "Extraction settings (clusters, min area, simplification, morphology)", false),
                ("crop", "Pixel rectangle to process instead of the whole image", false),
                ("georeference", "Bounding box or >= 4 control points for EPSG:4326 output", false),
            ],
            Self::MagicWand { .. } => vec![
                ("x", "Clicked pixel column", true),
                ("y", "Clicked pixel row", true),
                ("settings", "Selection mode, colors, tolerances and OCR engine", false),
                ("existing_polygons", "Polygons the selection must not overlap", false),
            ],
        }
    }
}

/// Result of executing a [`ZoneCommand`].
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneCommandOutput {
    Zones(ZoneCollection),
    Wand(WandResponse),
}

/// Holds the loaded image and an OCR chain, and runs commands against them.
#[derive(Debug, Clone, Default)]
pub struct ZoneManager {
    image: Option<RgbImage>,
    ocr: OcrChain,
}

impl ZoneManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ocr(mut self, ocr: OcrChain) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn load_image(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.image = Some(io::open_image(path)?);
        Ok(())
    }

    pub fn load_image_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.image = Some(io::decode_image(bytes)?);
        Ok(())
    }

    pub fn load_image_from_base64(&mut self, payload: &str) -> Result<()> {
        self.image = Some(io::decode_base64_image(payload)?);
        Ok(())
    }

    pub fn set_image(&mut self, image: RgbImage) {
        self.image = Some(image);
    }

    pub fn image(&self) -> Option<&RgbImage> {
        self.image.as_ref()
    }

    pub fn execute(&self, command: ZoneCommand) -> Result<ZoneCommandOutput> {
        self.execute_with_cancel(command, &CancelToken::new())
    }

    pub fn execute_with_cancel(&self, command: ZoneCommand, cancel: &CancelToken) -> Result<ZoneCommandOutput> {
        let image = self.image.as_ref().ok_or(ZoneError::NoImageLoaded)?;

        match command {
            ZoneCommand::ExtractZones { settings, crop, georeference } => {
                let pipeline = ExtractionPipeline::from_settings(&settings)?;
                let zones = pipeline.process_with_cancel(image, crop, georeference.as_ref(), cancel)?;
                Ok(ZoneCommandOutput::Zones(zones))
            }
            ZoneCommand::MagicWand { x, y, settings, existing_polygons } => {
                let wand = MagicWand::new(settings)?.with_ocr(self.ocr.clone());
                let existing = to_polygons(existing_polygons);
                let response = wand.select_with_cancel(image, x, y, &existing, cancel)?;
                Ok(ZoneCommandOutput::Wand(response))
            }
        }
    }
}

/// Build polygons from nested coordinate arrays, skipping any with a degenerate ring.
fn to_polygons(raw: Vec<Vec<Vec<[f64; 2]>>>) -> Vec<ZonePolygon> {
    raw.into_iter()
        .filter_map(|rings| {
            let polygon = rings
                .into_iter()
                .map(Ring::new)
                .collect::<Option<Vec<_>>>()
                .and_then(ZonePolygon::from_rings);
            match polygon {
                Some(polygon) => Some(polygon),
                None => {
                    warn!("ignoring existing polygon with a degenerate ring");
                    None
                }
            }
        })
        .collect()
}
