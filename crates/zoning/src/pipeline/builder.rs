use crate::{
    algorithms::{
        morphology::MaskCleaner,
        preprocessing::{ContrastEnhancePreprocessor, GaussianDenoisePreprocessor},
        segmentation::ColorSegmenter,
    },
    config::ExtractionSettings,
    pipeline::ExtractionPipeline,
    traits::ImagePreprocessor,
};

/// Builder for creating extraction pipelines with a fluent API.
///
/// Unset values take the [`ExtractionSettings`] defaults; preprocessors are
/// only added explicitly.
pub struct PipelineBuilder {
    preprocessors: Vec<Box<dyn ImagePreprocessor>>,
    color_clusters: usize,
    seed: Option<u64>,
    morph_kernel_size: u32,
    fill_holes: bool,
    simplify_tolerance: f64,
    min_area_percent: f64,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        let defaults = ExtractionSettings::default();
        Self {
            preprocessors: Vec::new(),
            color_clusters: defaults.color_clusters,
            seed: defaults.seed,
            morph_kernel_size: defaults.morph_kernel_size,
            fill_holes: defaults.fill_holes,
            simplify_tolerance: defaults.simplify_tolerance,
            min_area_percent: defaults.min_area_percent,
        }
    }

    /// Add a preprocessor, run before segmentation in insertion order
    pub fn add_preprocessor<P>(mut self, preprocessor: P) -> Self
    where
        P: ImagePreprocessor + 'static,
    {
        self.preprocessors.push(Box::new(preprocessor));
        self
    }

    /// Add Gaussian denoising as a preprocessing step
    pub fn with_denoise(self, sigma: f32) -> Self {
        self.add_preprocessor(GaussianDenoisePreprocessor { sigma })
    }

    /// Add CLAHE on the lightness channel (clip 2.0, 8x8 tiles)
    pub fn with_contrast_enhancement(self) -> Self {
        self.add_preprocessor(ContrastEnhancePreprocessor::default())
    }

    pub fn color_clusters(mut self, k: usize) -> Self {
        self.color_clusters = k;
        self
    }

    /// Fix the k-means++ seed for reproducible labels
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn morph_kernel_size(mut self, size: u32) -> Self {
        self.morph_kernel_size = size;
        self
    }

    pub fn fill_holes(mut self, fill: bool) -> Self {
        self.fill_holes = fill;
        self
    }

    /// Douglas-Peucker tolerance in pixels; 0 disables simplification
    pub fn simplify_tolerance(mut self, tolerance: f64) -> Self {
        self.simplify_tolerance = tolerance;
        self
    }

    pub fn min_area_percent(mut self, percent: f64) -> Self {
        self.min_area_percent = percent;
        self
    }

    pub fn build(self) -> ExtractionPipeline {
        ExtractionPipeline::new(
            self.preprocessors,
            ColorSegmenter::new(self.color_clusters).with_seed(self.seed),
            MaskCleaner::new(self.morph_kernel_size, self.fill_holes),
            self.simplify_tolerance,
            self.min_area_percent,
        )
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
