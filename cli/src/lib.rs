use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use zoning::{CropArea, ExtractionSettings, Georeference, WandSettings};

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ZoneError(#[from] zoning::ZoneError),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Batch extraction of every zone in one map image
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExtractJob {
    pub image: String,
    /// Where the GeoJSON FeatureCollection is written
    pub output: String,
    #[serde(default)]
    pub settings: ExtractionSettings,
    #[serde(default)]
    pub crop: Option<CropArea>,
    #[serde(default)]
    pub georeference: Option<Georeference>,
}

/// A single magic-wand click against one map image
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct WandJob {
    pub image: String,
    pub x: i64,
    pub y: i64,
    #[serde(default)]
    pub settings: WandSettings,
    /// Already accepted polygons in pixel coordinates, exterior ring first
    #[serde(default)]
    pub existing_polygons: Vec<Vec<Vec<[f64; 2]>>>,
}

/// Shared load/save for job files, picked by extension.
pub trait JobFile: Serialize + for<'de> Deserialize<'de> + Sized {
    fn from_toml(content: &str) -> Result<Self, JobError> {
        Ok(toml::from_str(content)?)
    }

    fn from_json(content: &str) -> Result<Self, JobError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load the job
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, JobError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml" | "json") => Ok(zoning::load_config_file(path_ref)?),
            _ => Err(JobError::UnsupportedFileFormat),
        }
    }

    fn to_toml(&self) -> Result<String, JobError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn to_json(&self) -> Result<String, JobError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), JobError> {
        let path_ref = path.as_ref();
        let content = match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => self.to_toml()?,
            Some("json") => self.to_json()?,
            _ => return Err(JobError::UnsupportedFileFormat),
        };
        fs::write(path_ref, content)?;
        Ok(())
    }
}

impl JobFile for ExtractJob {}
impl JobFile for WandJob {}

impl ExtractJob {
    /// Job with default settings, used to seed a config file for editing
    pub fn skeleton(image: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            output: output.into(),
            settings: ExtractionSettings::default(),
            crop: None,
            georeference: None,
        }
    }
}
