use crate::{
    config::{ExtractionSettings, WandSettings},
    georef::Georeference,
    manager::{ZoneCommand, ZoneCommandOutput, ZoneManager},
    ocr::OcrChain,
    types::{CollectionMetadata, CropArea, ZoneCollection},
    wand::WandResponse,
};
use rmcp::{
    handler::server::tool::IntoCallToolResult, model::{CallToolResult, Content, ServerCapabilities, ServerInfo}, schemars, tool, Error as McpError, ServerHandler
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use std::sync::{Arc, RwLock};

/// Request for loading an image from a file or an inline payload
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LoadImageRequest {
    #[schemars(description = "Path to the image file")]
    pub path: Option<String>,
    #[schemars(description = "Base64 image data, optionally with a data: URL prefix")]
    pub image_data: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ExtractZonesRequest {
    #[serde(default)]
    pub settings: ExtractionSettings,
    #[schemars(description = "Pixel rectangle to process instead of the whole image")]
    pub crop: Option<CropArea>,
    #[schemars(description = "Bounding box or control points for EPSG:4326 output")]
    pub georeference: Option<Georeference>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MagicWandRequest {
    #[schemars(description = "Clicked pixel column")]
    pub x: i64,
    #[schemars(description = "Clicked pixel row")]
    pub y: i64,
    #[serde(default)]
    pub settings: WandSettings,
    #[serde(default)]
    #[schemars(description = "Accepted polygons the selection must not overlap")]
    pub existing_polygons: Vec<Vec<Vec<[f64; 2]>>>,
}

/// Response containing zone extraction results
#[derive(Debug, Serialize, schemars::JsonSchema, TS)]
#[ts(export)]
pub struct ZonesResponse {
    #[schemars(description = "Number of zones extracted")]
    pub zone_count: usize,
    pub metadata: Option<CollectionMetadata>,
    #[schemars(description = "GeoJSON FeatureCollection of the zones")]
    #[ts(type = "unknown")]
    pub geojson: serde_json::Value,
}

impl ZonesResponse {
    fn from_collection(collection: &ZoneCollection) -> Self {
        match collection.to_geojson().and_then(|geojson| Ok(serde_json::to_value(geojson)?)) {
            Ok(geojson) => Self {
                zone_count: collection.len(),
                metadata: Some(collection.metadata.clone()),
                geojson,
            },
            Err(e) => Self::error(format!("Failed to convert to GeoJSON: {}", e)),
        }
    }

    fn error(message: String) -> Self {
        Self {
            zone_count: 0,
            metadata: None,
            geojson: serde_json::json!({ "error": message }),
        }
    }
}

impl IntoCallToolResult for ZonesResponse {
    fn into_call_tool_result(self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&self).unwrap_or_else(|_| format!("{:?}", self)),
        )]))
    }
}

impl IntoCallToolResult for WandResponse {
    fn into_call_tool_result(self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&self).unwrap_or_else(|_| format!("{:?}", self)),
        )]))
    }
}

fn wand_error(message: String) -> WandResponse {
    WandResponse {
        success: false,
        error: Some(message),
        ..Default::default()
    }
}

/// MCP server for zone extraction and magic-wand selection
#[derive(Clone)]
pub struct ZoneMcpServer {
    manager: Arc<RwLock<Option<ZoneManager>>>,
    ocr: OcrChain,
}

impl ZoneMcpServer {
    pub fn new() -> Self {
        Self::with_ocr(OcrChain::new())
    }

    /// Server whose wand selections are read by `ocr`
    pub fn with_ocr(ocr: OcrChain) -> Self {
        Self { manager: Arc::new(RwLock::new(None)), ocr }
    }

    fn run(&self, command: ZoneCommand) -> Result<ZoneCommandOutput, String> {
        let guard = self.manager.read().map_err(|_| "Image state is unavailable".to_string())?;
        let manager = guard
            .as_ref()
            .ok_or_else(|| "No image loaded. Please load an image first.".to_string())?;
        manager.execute(command).map_err(|e| e.to_string())
    }
}

impl Default for ZoneMcpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool(tool_box)]
impl ZoneMcpServer {
    #[tool(description = "Load a map image from a file path or base64 data")]
    fn load_image(&self, #[tool(aggr)] LoadImageRequest { path, image_data }: LoadImageRequest) -> String {
        let mut manager = ZoneManager::new().with_ocr(self.ocr.clone());
        let (source, loaded) = match (path, image_data) {
            (Some(path), _) => {
                let loaded = manager.load_image(&path);
                (path, loaded)
            }
            (None, Some(data)) => ("inline data".to_string(), manager.load_image_from_base64(&data)),
            (None, None) => return "Provide either path or image_data".to_string(),
        };
        if let Err(e) = loaded {
            return format!("Failed to load image from {}: {}", source, e);
        }

        let dimensions = manager.image().map(|image| image.dimensions()).unwrap_or_default();
        match self.manager.write() {
            Ok(mut slot) => {
                *slot = Some(manager);
                format!("Image loaded successfully from {} ({}x{})", source, dimensions.0, dimensions.1)
            }
            Err(_) => "Image state is unavailable".to_string(),
        }
    }

    #[tool(description = "Extract numbered zones from the loaded image by color segmentation")]
    fn extract_zones(&self, #[tool(aggr)] request: ExtractZonesRequest) -> ZonesResponse {
        let command = ZoneCommand::ExtractZones {
            settings: request.settings,
            crop: request.crop,
            georeference: request.georeference,
        };
        match self.run(command) {
            Ok(ZoneCommandOutput::Zones(collection)) => ZonesResponse::from_collection(&collection),
            Ok(other) => ZonesResponse::error(format!("Unexpected output: {:?}", other)),
            Err(e) => ZonesResponse::error(format!("Zone extraction failed: {}", e)),
        }
    }

    #[tool(description = "Select the region around a clicked pixel and return its polygon and OCR text")]
    fn magic_wand(&self, #[tool(aggr)] request: MagicWandRequest) -> WandResponse {
        let command = ZoneCommand::MagicWand {
            x: request.x,
            y: request.y,
            settings: request.settings,
            existing_polygons: request.existing_polygons,
        };
        match self.run(command) {
            Ok(ZoneCommandOutput::Wand(response)) => response,
            Ok(other) => wand_error(format!("Unexpected output: {:?}", other)),
            Err(e) => wand_error(e),
        }
    }

    #[tool(description = "Get information about available commands and their parameters")]
    fn get_command_info(&self) -> String {
        let mut info = String::new();
        info.push_str("Available ZoneCommands:\n\n");

        for (i, name) in ZoneCommand::command_names().iter().enumerate() {
            info.push_str(&format!("{}. {}\n", i + 1, name));
        }

        info.push_str("\nCommand Details:\n");
        let commands = [
            ZoneCommand::default(),
            ZoneCommand::MagicWand {
                x: 0,
                y: 0,
                settings: WandSettings::default(),
                existing_polygons: Vec::new(),
            },
        ];

        for cmd in commands {
            info.push_str(&format!("\n- {}\n", cmd));
            info.push_str(&format!("  Description: {}\n", cmd.description()));

            let params = cmd.parameters_info();
            if !params.is_empty() {
                info.push_str("  Parameters:\n");
                for (name, desc, required) in params {
                    let req_marker = if required { " (required)" } else { " (optional)" };
                    info.push_str(&format!("    - {}{}: {}\n", name, req_marker, desc));
                }
            }
        }

        info
    }

    #[tool(description = "Get the JSON schema for ZoneCommand")]
    fn get_command_schema(&self) -> String {
        let schema = ZoneCommand::schema();
        serde_json::to_string_pretty(&schema)
            .unwrap_or_else(|e| format!("Failed to serialize schema: {}", e))
    }
}

#[tool(tool_box)]
impl ServerHandler for ZoneMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Map Zoning Server - Convert raster maps into numbered vector zones with optional georeferencing, and carve single regions with a boundary-aware magic wand.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
