use image::RgbImage;
use crate::{error::Result, ocr::{RecognitionRequest, TextReading}};

/// Trait for image preprocessing applied before color segmentation
pub trait ImagePreprocessor: Send + Sync {
    /// Preprocess the input image (e.g., denoise)
    fn preprocess(&self, image: &RgbImage) -> Result<RgbImage>;
}

/// Text-extraction capability provided by an external OCR engine.
///
/// Implementations own their client handles; the core only asks whether the
/// engine is usable and hands it a prepared region.
pub trait TextRecognizer: Send + Sync {
    /// Short identifier used in logs and engine selection.
    fn name(&self) -> &str;

    /// Whether the engine is configured and reachable right now.
    fn is_available(&self) -> bool;

    /// Read the text inside the prepared region.
    fn recognize(&self, request: &RecognitionRequest) -> Result<TextReading>;
}
