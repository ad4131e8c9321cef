//! Upstream `/debug/vars` document (JSON).
//!
//! xray publishes every expvar it knows about on this endpoint; only the
//! `observatory` and `stats` members are decoded, everything else is ignored.
//! Missing or `null` maps decode as empty so a partially configured instance
//! still produces a usable snapshot.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Deserializer};

use crate::error::{ExporterError, FetchErrorKind, Result};

/// One instance's snapshot, transient per scrape.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct DebugVars {
    /// Latency probes keyed by observer entry name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub observatory: BTreeMap<String, ObservatoryEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stats: Stats,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Stats {
    #[serde(default, deserialize_with = "null_as_default")]
    pub inbound: BTreeMap<String, Traffic>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub outbound: BTreeMap<String, Traffic>,
}

/// Byte counters of one inbound or outbound handler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize)]
pub struct Traffic {
    #[serde(default)]
    pub downlink: f64,
    #[serde(default)]
    pub uplink: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct ObservatoryEntry {
    /// Milliseconds.
    #[serde(default)]
    pub delay: f64,
    #[serde(default)]
    pub outbound_tag: String,
}

impl ObservatoryEntry {
    /// Label for this probe; falls back to the map key when xray omits the tag.
    pub fn tag<'a>(&'a self, key: &'a str) -> &'a str {
        if self.outbound_tag.is_empty() {
            key
        } else {
            &self.outbound_tag
        }
    }
}

fn null_as_default<'de, D, T>(de: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// Decode a fully drained response body. `server` names the instance in errors.
pub fn decode_debug_vars(server: &str, body: Bytes) -> Result<DebugVars> {
    serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(server = %server, body_len = body.len(), "debug vars decode failed");
        ExporterError::fetch(server, FetchErrorKind::Decode, format!("invalid debug vars: {e}"))
    })
}
