use std::time::Duration;

use async_trait::async_trait;

use xray_exporter_core::error::{ExporterError, FetchErrorKind, Result};
use xray_exporter_core::vars::{decode_debug_vars, DebugVars};

use crate::config::InstanceConfig;

/// Where instance snapshots come from. The orchestrator only sees this trait.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch(&self, instance: &InstanceConfig) -> Result<DebugVars>;
}

/// `GET {host}/debug/vars` over a shared, pooled `reqwest::Client`.
#[derive(Clone)]
pub struct HttpStatsSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpStatsSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ExporterError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self::with_client(client, timeout))
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

fn classify(server: &str, url: &str, e: reqwest::Error) -> ExporterError {
    let kind = if e.is_timeout() {
        FetchErrorKind::Timeout
    } else {
        FetchErrorKind::Transport
    };
    ExporterError::fetch(server, kind, format!("GET {url}: {e}"))
}

#[async_trait]
impl StatsSource for HttpStatsSource {
    async fn fetch(&self, instance: &InstanceConfig) -> Result<DebugVars> {
        let url = instance.vars_url();

        // The deadline covers connect, headers and the whole body.
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify(&instance.server, &url, e))?;

        let status = resp.status();
        // Read to the end before looking at status or payload so the
        // connection goes back to the pool in a clean state.
        let body = resp
            .bytes()
            .await
            .map_err(|e| classify(&instance.server, &url, e))?;

        if !status.is_success() {
            return Err(ExporterError::fetch(
                &instance.server,
                FetchErrorKind::Status,
                format!("GET {url}: upstream returned {status}"),
            ));
        }

        decode_debug_vars(&instance.server, body)
    }
}
