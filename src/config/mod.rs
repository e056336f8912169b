use serde::Deserialize;
use std::path::{Path, PathBuf};

pub use crate::broker::BrokerConfig;

/// Complete Floorplan configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FloorplanConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Broker settings used for zones without their own entry
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Where client-local state (overlay, broker settings) is kept
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_directory")]
    pub directory: PathBuf,
}

fn default_storage_directory() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: default_storage_directory(),
        }
    }
}

/// Base layout and overlay settings
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    /// Replacement for the bundled base layout
    #[serde(default)]
    pub base_layout: Option<PathBuf>,

    /// Storage key of the overlay document
    #[serde(default = "default_overlay_key")]
    pub overlay_key: String,
}

fn default_overlay_key() -> String {
    crate::overlay::OVERLAY_STORAGE_KEY.to_string()
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            base_layout: None,
            overlay_key: default_overlay_key(),
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow cross-origin requests from the browser dashboard
    #[serde(default = "default_cors")]
    pub cors: bool,
}

fn default_port() -> u16 {
    3000
}

fn default_cors() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cors: default_cors(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> anyhow::Result<FloorplanConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: FloorplanConfig = toml::from_str(&contents)?;
    Ok(config)
}
