//! OCR strategy chain for wand selections.
//!
//! Recognizers are supplied by the host process; the chain only orders them,
//! prepares the image region and takes the first non-empty reading.

use std::sync::Arc;

use image::{Rgb, RgbImage, imageops};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};
use tracing::{debug, warn};
use ts_rs::TS;

use crate::{
    traits::TextRecognizer,
    types::{BinaryMask, PixelBox},
};

/// Padding added around the selection before recognition.
pub const REGION_PADDING: u32 = 10;
/// Regions narrower or shorter than this are not sent to any engine.
pub const MIN_REGION_SIDE: u32 = 10;

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema, TS,
    Display, EnumString, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[ts(export)]
pub enum OcrEngine {
    /// Vision-language model
    #[default]
    Ai,
    /// Local OCR engine
    Tesseract,
}

/// Image handed to a recognizer. Pixels outside the selection are white.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub region: RgbImage,
    /// Model identifier for engines that take one.
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct TextReading {
    pub text: String,
    pub confidence: f64,
}

impl TextReading {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Ordered list of recognizers, each registered under the engine it implements.
#[derive(Clone, Default)]
pub struct OcrChain {
    providers: Vec<(OcrEngine, Arc<dyn TextRecognizer>)>,
}

impl std::fmt::Debug for OcrChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|(engine, provider)| (engine, provider.name())))
            .finish()
    }
}

impl OcrChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, engine: OcrEngine, provider: Arc<dyn TextRecognizer>) -> Self {
        self.providers.push((engine, provider));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers of the preferred engine first, then the rest in registration order.
    pub fn ordered(&self, preferred: OcrEngine) -> Vec<&Arc<dyn TextRecognizer>> {
        let (first, rest): (Vec<_>, Vec<_>) =
            self.providers.iter().partition(|(engine, _)| *engine == preferred);
        first.into_iter().chain(rest).map(|(_, provider)| provider).collect()
    }

    /// First non-empty reading in priority order. Unavailable or failing
    /// providers are skipped; with no reading the result is empty text at 0.0.
    pub fn recognize(&self, preferred: OcrEngine, request: &RecognitionRequest) -> TextReading {
        for provider in self.ordered(preferred) {
            if !provider.is_available() {
                debug!(provider = provider.name(), "OCR provider unavailable");
                continue;
            }
            match provider.recognize(request) {
                Ok(reading) if !reading.text.trim().is_empty() => {
                    debug!(provider = provider.name(), confidence = reading.confidence, "OCR succeeded");
                    return reading;
                }
                Ok(_) => debug!(provider = provider.name(), "OCR returned no text"),
                Err(e) => warn!(provider = provider.name(), error = %e, "OCR provider failed"),
            }
        }
        TextReading::empty()
    }

    /// Prepare the selection region and run the chain. Skips recognition when
    /// the box is empty or narrower or shorter than [`MIN_REGION_SIDE`].
    pub fn read_selection(
        &self,
        image: &RgbImage,
        mask: &BinaryMask,
        bbox: PixelBox,
        preferred: OcrEngine,
        model: Option<&str>,
    ) -> TextReading {
        if self.is_empty() || bbox.is_empty() {
            return TextReading::empty();
        }
        match prepare_region(image, mask, bbox, REGION_PADDING) {
            Some(region) => self.recognize(
                preferred,
                &RecognitionRequest { region, model: model.map(str::to_string) },
            ),
            None => {
                debug!(?bbox, "selection too small for OCR");
                TextReading::empty()
            }
        }
    }
}

/// Crop `bbox` grown by `padding` and clamped to the image, whitening every
/// pixel the mask does not cover. `None` when either side of the unpadded box
/// is under [`MIN_REGION_SIDE`].
pub fn prepare_region(
    image: &RgbImage,
    mask: &BinaryMask,
    bbox: PixelBox,
    padding: u32,
) -> Option<RgbImage> {
    if bbox.width < MIN_REGION_SIDE || bbox.height < MIN_REGION_SIDE {
        return None;
    }
    let x0 = bbox.x.saturating_sub(padding);
    let y0 = bbox.y.saturating_sub(padding);
    let x1 = (bbox.x + bbox.width + padding).min(image.width());
    let y1 = (bbox.y + bbox.height + padding).min(image.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let (width, height) = (x1 - x0, y1 - y0);

    let mut region = imageops::crop_imm(image, x0, y0, width, height).to_image();
    for (x, y, pixel) in region.enumerate_pixels_mut() {
        if !mask.get(x0 + x, y0 + y) {
            *pixel = Rgb([255, 255, 255]);
        }
    }
    Some(region)
}
