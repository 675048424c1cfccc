use std::{fs, path::Path};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};
use ts_rs::TS;

use crate::{
    error::{Result, ZoneError},
    ocr::OcrEngine,
};

/// Settings for batch zone extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[serde(default)]
#[ts(export)]
pub struct ExtractionSettings {
    #[schemars(description = "Number of color clusters for segmentation", range(min = 2, max = 256))]
    pub color_clusters: usize,
    #[schemars(description = "Minimum polygon area as a percentage of the image area")]
    pub min_area_percent: f64,
    #[schemars(description = "Douglas-Peucker tolerance in pixels (0 disables)")]
    pub simplify_tolerance: f64,
    #[schemars(description = "Side of the square morphology kernel", range(min = 1))]
    pub morph_kernel_size: u32,
    pub fill_holes: bool,
    #[schemars(description = "Simplify traced contours")]
    pub smooth_contours: bool,
    #[schemars(description = "Gaussian denoise sigma applied before segmentation (0 disables)")]
    pub denoise_sigma: f32,
    #[schemars(description = "Equalize lightness contrast (CLAHE) before segmentation")]
    pub enhance_contrast: bool,
    #[schemars(description = "Seed for k-means++ initialisation (random when absent)")]
    #[ts(type = "number | null")]
    pub seed: Option<u64>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            color_clusters: 32,
            min_area_percent: 0.1,
            simplify_tolerance: 2.0,
            morph_kernel_size: 3,
            fill_holes: true,
            smooth_contours: true,
            denoise_sigma: 1.0,
            enhance_contrast: true,
            seed: None,
        }
    }
}

impl ExtractionSettings {
    pub fn validate(&self) -> Result<()> {
        if !(2..=256).contains(&self.color_clusters) {
            return Err(invalid(format!(
                "color_clusters must be in [2, 256], got {}",
                self.color_clusters
            )));
        }
        if !(self.min_area_percent > 0.0 && self.min_area_percent <= 100.0) {
            return Err(invalid(format!(
                "min_area_percent must be in (0, 100], got {}",
                self.min_area_percent
            )));
        }
        if !(self.simplify_tolerance >= 0.0 && self.simplify_tolerance.is_finite()) {
            return Err(invalid(format!(
                "simplify_tolerance must be a finite value >= 0, got {}",
                self.simplify_tolerance
            )));
        }
        if self.morph_kernel_size < 1 {
            return Err(invalid("morph_kernel_size must be >= 1".to_string()));
        }
        if !(self.denoise_sigma >= 0.0 && self.denoise_sigma.is_finite()) {
            return Err(invalid(format!(
                "denoise_sigma must be a finite value >= 0, got {}",
                self.denoise_sigma
            )));
        }
        Ok(())
    }

    /// Simplification tolerance actually applied during batch extraction.
    pub fn effective_simplify_tolerance(&self) -> f64 {
        if self.smooth_contours { self.simplify_tolerance } else { 0.0 }
    }
}

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema, TS,
    Display, EnumString, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[ts(export)]
pub enum SelectionMode {
    /// Fill until a pixel close to the boundary color is reached
    #[default]
    Boundary,
    /// Fill pixels within a fixed per-channel range of the seed color
    Tolerance,
}

/// Settings for one magic-wand click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[serde(default)]
#[ts(export)]
pub struct WandSettings {
    pub mode: SelectionMode,
    #[schemars(description = "RGB color that bounds the fill in boundary mode")]
    pub boundary_color: [u8; 3],
    #[schemars(description = "Per-channel closeness to the boundary color")]
    pub boundary_tolerance: u8,
    #[schemars(description = "Per-channel range around the seed color in tolerance mode")]
    pub tolerance: u8,
    #[schemars(description = "Douglas-Peucker tolerance in pixels (0 disables)")]
    pub simplify_tolerance: f64,
    pub ocr_engine: OcrEngine,
    #[schemars(description = "Model identifier for the AI OCR engine")]
    pub ai_model: String,
}

impl Default for WandSettings {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Boundary,
            boundary_color: [152, 152, 152],
            boundary_tolerance: 15,
            tolerance: 32,
            simplify_tolerance: 2.0,
            ocr_engine: OcrEngine::Ai,
            ai_model: "google/gemini-2.0-flash-001".to_string(),
        }
    }
}

impl WandSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.simplify_tolerance >= 0.0 && self.simplify_tolerance.is_finite()) {
            return Err(invalid(format!(
                "simplify_tolerance must be a finite value >= 0, got {}",
                self.simplify_tolerance
            )));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ZoneError {
    ZoneError::InvalidSettings(message)
}

/// Load any deserialisable config from a `.toml` or `.json` file, chosen by extension.
pub fn load_config_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(toml::from_str(&fs::read_to_string(path)?)?),
        Some("json") => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        other => Err(invalid(format!(
            "unsupported config format {:?}, use .toml or .json",
            other.unwrap_or("")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ExtractionSettings::default().validate().expect("default extraction settings");
        WandSettings::default().validate().expect("default wand settings");
    }

    #[test]
    fn out_of_range_settings_are_rejected() {
        let settings = ExtractionSettings { color_clusters: 1, ..Default::default() };
        assert!(matches!(settings.validate(), Err(ZoneError::InvalidSettings(_))));

        let settings = ExtractionSettings { min_area_percent: 0.0, ..Default::default() };
        assert!(settings.validate().is_err());

        let settings = ExtractionSettings { morph_kernel_size: 0, ..Default::default() };
        assert!(settings.validate().is_err());

        let settings = ExtractionSettings { denoise_sigma: -1.0, ..Default::default() };
        assert!(settings.validate().is_err());
        let settings = ExtractionSettings { denoise_sigma: 0.0, ..Default::default() };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let settings: ExtractionSettings = toml::from_str("color_clusters = 8\nfill_holes = false").unwrap();
        assert_eq!(settings.color_clusters, 8);
        assert!(!settings.fill_holes);
        assert_eq!(settings.simplify_tolerance, 2.0);
    }

    #[test]
    fn wand_settings_parse_engine_names() {
        let settings: WandSettings =
            serde_json::from_str(r#"{"mode": "tolerance", "ocr_engine": "tesseract"}"#).unwrap();
        assert_eq!(settings.mode, SelectionMode::Tolerance);
        assert_eq!(settings.ocr_engine, OcrEngine::Tesseract);
        assert_eq!(settings.boundary_color, [152, 152, 152]);
    }

    #[test]
    fn config_file_format_follows_extension() {
        let dir = std::env::temp_dir();
        let toml_path = dir.join(format!("zoning-settings-{}.toml", std::process::id()));
        let json_path = dir.join(format!("zoning-settings-{}.json", std::process::id()));
        fs::write(&toml_path, "color_clusters = 12\nenhance_contrast = false").unwrap();
        fs::write(&json_path, r#"{"mode": "tolerance", "tolerance": 20}"#).unwrap();

        let extraction: ExtractionSettings = load_config_file(&toml_path).unwrap();
        let wand: WandSettings = load_config_file(&json_path).unwrap();
        fs::remove_file(&toml_path).unwrap();
        fs::remove_file(&json_path).unwrap();

        assert_eq!(extraction.color_clusters, 12);
        assert!(!extraction.enhance_contrast);
        assert_eq!(extraction.denoise_sigma, 1.0);
        assert_eq!(wand.mode, SelectionMode::Tolerance);
        assert_eq!(wand.tolerance, 20);

        let unsupported: Result<ExtractionSettings> = load_config_file(dir.join("settings.yaml"));
        assert!(matches!(unsupported, Err(ZoneError::InvalidSettings(_))));
    }

    #[test]
    fn smoothing_flag_disables_simplification() {
        let settings = ExtractionSettings { smooth_contours: false, ..Default::default() };
        assert_eq!(settings.effective_simplify_tolerance(), 0.0);
    }
}
