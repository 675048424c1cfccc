pub mod builder;

use image::{RgbImage, imageops};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    algorithms::{
        assignment::assign, extraction::ContourVectorizer, morphology::MaskCleaner,
        segmentation::ColorSegmenter,
    },
    cancel::CancelToken,
    config::ExtractionSettings,
    error::{Result, ZoneError},
    georef::{GeoTransformer, Georeference},
    traits::ImagePreprocessor,
    types::{CollectionMetadata, CropArea, ZoneCollection, ZonePolygon},
};

/// Batch extraction: segment by color, clean each label's mask, trace the
/// regions, number them and optionally georeference the result.
pub struct ExtractionPipeline {
    preprocessors: Vec<Box<dyn ImagePreprocessor>>,
    segmenter: ColorSegmenter,
    cleaner: MaskCleaner,
    simplify_tolerance: f64,
    min_area_percent: f64,
}

impl ExtractionPipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    pub fn new(
        preprocessors: Vec<Box<dyn ImagePreprocessor>>,
        segmenter: ColorSegmenter,
        cleaner: MaskCleaner,
        simplify_tolerance: f64,
        min_area_percent: f64,
    ) -> Self {
        Self {
            preprocessors,
            segmenter,
            cleaner,
            simplify_tolerance,
            min_area_percent,
        }
    }

    /// Validate `settings` and build the matching pipeline.
    pub fn from_settings(settings: &ExtractionSettings) -> Result<Self> {
        settings.validate()?;
        let mut builder = Self::builder()
            .color_clusters(settings.color_clusters)
            .seed(settings.seed)
            .morph_kernel_size(settings.morph_kernel_size)
            .fill_holes(settings.fill_holes)
            .simplify_tolerance(settings.effective_simplify_tolerance())
            .min_area_percent(settings.min_area_percent);
        if settings.denoise_sigma > 0.0 {
            builder = builder.with_denoise(settings.denoise_sigma);
        }
        if settings.enhance_contrast {
            builder = builder.with_contrast_enhancement();
        }
        Ok(builder.build())
    }

    pub fn process(
        &self,
        image: &RgbImage,
        crop: Option<CropArea>,
        georeference: Option<&Georeference>,
    ) -> Result<ZoneCollection> {
        self.process_with_cancel(image, crop, georeference, &CancelToken::new())
    }

    pub fn process_with_cancel(
        &self,
        image: &RgbImage,
        crop: Option<CropArea>,
        georeference: Option<&Georeference>,
        cancel: &CancelToken,
    ) -> Result<ZoneCollection> {
        let (original_width, original_height) = image.dimensions();

        // Step 1: Crop, then run preprocessors in sequence
        let mut working = match crop {
            Some(area) => crop_image(image, area)?,
            None => image.clone(),
        };
        for preprocessor in &self.preprocessors {
            working = preprocessor.preprocess(&working)?;
        }
        let (width, height) = working.dimensions();
        cancel.check()?;

        // Fit the projection before the expensive stages so a degenerate
        // georeference fails fast.
        let transformer = GeoTransformer::new(georeference, width, height)?;

        // Step 2: Cluster colors
        let labels = self.segmenter.segment_with_cancel(&working, cancel)?;
        cancel.check()?;

        // Step 3: Clean and trace every label's mask
        let vectorizer = ContourVectorizer::new(self.simplify_tolerance)
            .with_min_area_percent(self.min_area_percent, width as f64 * height as f64);
        let per_label = labels
            .present_labels()
            .into_par_iter()
            .map(|label| {
                cancel.check()?;
                let mask = self.cleaner.clean(&labels.mask_for(label));
                let rings = vectorizer.trace(&mask);
                debug!(label, regions = rings.len(), "traced label");
                Ok(rings)
            })
            .collect::<Result<Vec<_>>>()?;
        let polygons: Vec<ZonePolygon> = per_label
            .into_iter()
            .flatten()
            .map(ZonePolygon::new)
            .collect();
        cancel.check()?;

        // Step 4: Number zones, then map to output coordinates
        let zones = transformer.transform_zones(assign(polygons))?;

        info!(
            zones = zones.len(),
            width,
            height,
            coordinate_system = transformer.coordinate_system(),
            "extracted zones"
        );

        Ok(ZoneCollection {
            zones,
            metadata: CollectionMetadata {
                image_width: width,
                image_height: height,
                original_width,
                original_height,
                georeferenced: transformer.is_georeferenced(),
                coordinate_system: transformer.coordinate_system().to_string(),
            },
        })
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        format!(
            "ExtractionPipeline: {} preprocessors, k={}, kernel={}, fill_holes={}, simplify={}, min_area={}%",
            self.preprocessors.len(),
            self.segmenter.k,
            self.cleaner.kernel_size,
            self.cleaner.fill_holes,
            self.simplify_tolerance,
            self.min_area_percent
        )
    }
}

/// Cut `area` out of `image`, rejecting empty or out-of-bounds rectangles.
pub fn crop_image(image: &RgbImage, area: CropArea) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    if !area.fits(width, height) {
        return Err(ZoneError::CropOutOfBounds {
            x: area.x,
            y: area.y,
            crop_width: area.width,
            crop_height: area.height,
            width,
            height,
        });
    }
    Ok(imageops::crop_imm(image, area.x, area.y, area.width, area.height).to_image())
}
