//! Shared application state for the bridge.
//!
//! Owns the metrics registry (through the scraper) so there is no
//! process-wide singleton. Startup errors are returned to `main` instead of
//! panicking.

use std::sync::Arc;
use std::time::Duration;

use xray_exporter_core::error::Result;

use crate::config::BridgeConfig;
use crate::obs::metrics::BridgeMetrics;
use crate::scrape::{HttpStatsSource, ScrapePolicy, Scraper, StatsSource};

#[derive(Clone)]
pub struct AppState {
    scraper: Arc<Scraper>,
}

impl AppState {
    /// Build state that polls upstreams over HTTP.
    pub fn new(cfg: BridgeConfig) -> Result<Self> {
        let source = HttpStatsSource::new(Duration::from_millis(cfg.scrape.timeout_ms))?;
        Ok(Self::with_source(cfg, Arc::new(source)))
    }

    /// Build state around any snapshot source.
    pub fn with_source(cfg: BridgeConfig, source: Arc<dyn StatsSource>) -> Self {
        tracing::info!(
            instances = cfg.instances.len(),
            timeout_ms = cfg.scrape.timeout_ms,
            allowlist = cfg.scrape.inbound_allowlist.is_some(),
            "bridge state ready"
        );

        let metrics = Arc::new(BridgeMetrics::new(&cfg.scrape.namespace));
        let policy = ScrapePolicy::from_section(&cfg.scrape);
        let scraper = Scraper::new(cfg.instances, source, metrics, policy);

        Self { scraper: Arc::new(scraper) }
    }

    pub fn scraper(&self) -> &Scraper {
        &self.scraper
    }
}
