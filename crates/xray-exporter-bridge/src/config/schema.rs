use std::collections::HashSet;
use std::net::SocketAddr;

use serde::Deserialize;
use xray_exporter_core::error::{ExporterError, Result};

/// Top-level document. Unknown keys are ignored and missing ones zero-filled.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub listen_addr: String,

    #[serde(default)]
    pub instances: Vec<InstanceConfig>,

    #[serde(default)]
    pub scrape: ScrapeSection,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        self.scrape.validate()?;

        let mut seen = HashSet::new();
        for inst in &self.instances {
            if !seen.insert(inst.server.as_str()) {
                // Series from both instances collapse into one label set.
                tracing::warn!(server = %inst.server, "duplicate server name in instances");
            }
        }
        Ok(())
    }

    /// Parse `listen_addr`. A bare `:port` binds every interface and an
    /// empty address means `0.0.0.0:80`.
    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        let raw = self.listen_addr.trim();
        let full = if raw.is_empty() {
            "0.0.0.0:80".to_string()
        } else if raw.starts_with(':') {
            format!("0.0.0.0{raw}")
        } else {
            raw.to_string()
        };
        full.parse().map_err(|e| {
            ExporterError::Config(format!("listen_addr {:?} is not a socket address: {e}", self.listen_addr))
        })
    }
}

/// One upstream xray process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceConfig {
    /// Value of the `server` label.
    #[serde(default)]
    pub server: String,
    /// Base URL, e.g. `http://10.0.0.2:9090`.
    #[serde(default)]
    pub host: String,
}

impl InstanceConfig {
    pub fn vars_url(&self) -> String {
        format!("{}/debug/vars", self.host.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapeSection {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_delay_threshold_ms")]
    pub delay_threshold_ms: f64,

    #[serde(default = "default_delay_sentinel")]
    pub delay_sentinel: f64,

    /// `None` exports every inbound tag.
    #[serde(default)]
    pub inbound_allowlist: Option<Vec<String>>,

    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            delay_threshold_ms: default_delay_threshold_ms(),
            delay_sentinel: default_delay_sentinel(),
            inbound_allowlist: None,
            namespace: default_namespace(),
        }
    }
}

impl ScrapeSection {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(ExporterError::Config("scrape.timeout_ms must be greater than 0".into()));
        }
        if self.namespace.is_empty() {
            return Err(ExporterError::Config("scrape.namespace must not be empty".into()));
        }
        Ok(())
    }
}

fn default_timeout_ms() -> u64 {
    3000
}
fn default_delay_threshold_ms() -> f64 {
    10000.0
}
fn default_delay_sentinel() -> f64 {
    -1.0
}
fn default_namespace() -> String {
    "xray".into()
}
