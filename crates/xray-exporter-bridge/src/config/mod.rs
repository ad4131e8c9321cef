//! Bridge config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use xray_exporter_core::error::{ExporterError, Result};

pub use schema::{BridgeConfig, InstanceConfig, ScrapeSection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.yaml`/`.yml` select YAML; anything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<BridgeConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)
        .map_err(|e| ExporterError::Config(format!("read config {} failed: {e}", path.display())))?;
    load_from_str(&s, ConfigFormat::from_path(path))
}

pub fn load_from_str(s: &str, format: ConfigFormat) -> Result<BridgeConfig> {
    let cfg: BridgeConfig = match format {
        ConfigFormat::Json => serde_json::from_str(s)
            .map_err(|e| ExporterError::Config(format!("invalid json: {e}")))?,
        ConfigFormat::Yaml => serde_yaml::from_str(s)
            .map_err(|e| ExporterError::Config(format!("invalid yaml: {e}")))?,
    };
    cfg.validate()?;
    Ok(cfg)
}
