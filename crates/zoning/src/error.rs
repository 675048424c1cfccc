use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZoneError {
    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Failed to decode image payload: {0}")]
    Decode(String),

    #[error("No image loaded")]
    NoImageLoaded,

    #[error("Seed point ({x}, {y}) out of image bounds ({width}x{height})")]
    SeedOutOfBounds { x: i64, y: i64, width: u32, height: u32 },

    #[error("Crop area {x},{y} {crop_width}x{crop_height} exceeds image bounds ({width}x{height})")]
    CropOutOfBounds {
        x: u32,
        y: u32,
        crop_width: u32,
        crop_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Georeference transform is degenerate: {0}")]
    DegenerateTransform(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Invalid zone GeoJSON: {0}")]
    InvalidGeoJson(String),
}

impl ZoneError {
    /// True for conditions caused by caller input rather than by the image content.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SeedOutOfBounds { .. } | Self::CropOutOfBounds { .. } | Self::InvalidSettings(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ZoneError>;
