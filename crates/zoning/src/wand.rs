//! Click-driven region selection.
//!
//! One click runs: flood fill, mask cleanup, largest-contour vectorization,
//! overlap check against accepted polygons and, when recognizers are
//! configured, OCR of the selected region.

use image::RgbImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tracing::{debug, info};
use ts_rs::TS;

use crate::{
    algorithms::{
        extraction::ContourVectorizer,
        flood_fill::{self, SelectionOutcome},
        morphology::MaskCleaner,
        overlap::overlaps,
    },
    cancel::CancelToken,
    config::{SelectionMode, WandSettings},
    error::{Result, ZoneError},
    ocr::OcrChain,
    types::{PixelBox, ZonePolygon},
};

/// Smallest traced area, in px², accepted as a selection.
pub const MIN_SELECTION_AREA: f64 = 10.0;
const REFINE_KERNEL_SIZE: u32 = 3;

/// Why a click did not produce a polygon.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema, TS,
    Display, IntoStaticStr
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[ts(export)]
pub enum WandFailure {
    SelectionTooLarge,
    NoRegion,
    Overlap,
    SeedOnBoundary,
    OutOfBounds,
}

impl WandFailure {
    /// User-facing explanation.
    pub fn message(&self) -> &'static str {
        match self {
            Self::SelectionTooLarge => {
                "Selection too large - the boundary color may not be present in this area. \
                 Try adjusting the boundary color or tolerance."
            }
            Self::NoRegion => "No valid region selected. Try adjusting tolerance or clicking elsewhere.",
            Self::Overlap => {
                "This area overlaps with an existing selection. Please select a different area."
            }
            Self::SeedOnBoundary => "The clicked pixel is on a boundary line. Click inside a region.",
            Self::OutOfBounds => "The clicked point is outside the image.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct WandResponse {
    pub success: bool,
    /// Rings of the selected polygon in pixel coordinates, exterior first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<Vec<[f64; 2]>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<PixelBox>,
    pub ocr_text: String,
    pub ocr_confidence: f64,
    pub area: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<WandFailure>,
}

impl WandResponse {
    pub fn failed(failure: WandFailure) -> Self {
        Self::failed_with(failure, failure.message().to_string())
    }

    fn failed_with(failure: WandFailure, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            failure: Some(failure),
            ..Default::default()
        }
    }

    /// The selected polygon, when the click succeeded.
    pub fn zone_polygon(&self) -> Option<ZonePolygon> {
        let rings = self
            .polygon
            .as_ref()?
            .iter()
            .map(|points| crate::types::Ring::new(points.clone()))
            .collect::<Option<Vec<_>>>()?;
        ZonePolygon::from_rings(rings)
    }
}

/// Magic-wand selector with an injected OCR chain.
#[derive(Debug, Clone, Default)]
pub struct MagicWand {
    settings: WandSettings,
    ocr: OcrChain,
}

impl MagicWand {
    pub fn new(settings: WandSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings, ocr: OcrChain::new() })
    }

    pub fn with_ocr(mut self, ocr: OcrChain) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn settings(&self) -> &WandSettings {
        &self.settings
    }

    pub fn select(&self, image: &RgbImage, x: i64, y: i64, existing: &[ZonePolygon]) -> Result<WandResponse> {
        self.select_with_cancel(image, x, y, existing, &CancelToken::new())
    }

    /// Expected rejections come back as a failed [`WandResponse`]; only
    /// cancellation and unexpected conditions are errors.
    pub fn select_with_cancel(
        &self,
        image: &RgbImage,
        x: i64,
        y: i64,
        existing: &[ZonePolygon],
        cancel: &CancelToken,
    ) -> Result<WandResponse> {
        let settings = &self.settings;
        let selection = match settings.mode {
            SelectionMode::Boundary => flood_fill::select_boundary_with_cancel(
                image,
                x,
                y,
                settings.boundary_color,
                settings.boundary_tolerance,
                cancel,
            ),
            SelectionMode::Tolerance => {
                flood_fill::select_tolerance_with_cancel(image, x, y, settings.tolerance, cancel)
            }
        };
        let selection = match selection {
            Ok(selection) => selection,
            Err(e @ ZoneError::SeedOutOfBounds { .. }) => {
                return Ok(WandResponse::failed_with(WandFailure::OutOfBounds, e.to_string()));
            }
            Err(e) => return Err(e),
        };

        match selection.outcome {
            SelectionOutcome::Selected => {}
            SelectionOutcome::SeedOnBoundary => return Ok(WandResponse::failed(WandFailure::SeedOnBoundary)),
            SelectionOutcome::TooLarge => return Ok(WandResponse::failed(WandFailure::SelectionTooLarge)),
        }
        cancel.check()?;

        let refined = MaskCleaner::new(REFINE_KERNEL_SIZE, false).clean(&selection.mask);
        let Some(region) = ContourVectorizer::new(settings.simplify_tolerance)
            .with_min_area(MIN_SELECTION_AREA)
            .trace_largest(&refined)
        else {
            debug!(x, y, "selection produced no usable contour");
            return Ok(WandResponse::failed(WandFailure::NoRegion));
        };

        if overlaps(&region.ring, existing) {
            debug!(x, y, "selection overlaps an existing polygon");
            return Ok(WandResponse::failed(WandFailure::Overlap));
        }
        cancel.check()?;

        let reading = self.ocr.read_selection(
            image,
            &refined,
            selection.bbox,
            settings.ocr_engine,
            Some(&settings.ai_model),
        );

        info!(x, y, area = region.area, text = %reading.text, "wand selection");

        Ok(WandResponse {
            success: true,
            polygon: Some(vec![region.ring.points().to_vec()]),
            centroid: Some(region.centroid),
            bbox: Some(selection.bbox),
            ocr_text: reading.text,
            ocr_confidence: reading.confidence,
            area: region.area,
            error: None,
            failure: None,
        })
    }
}
