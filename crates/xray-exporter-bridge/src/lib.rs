//! xray-exporter bridge library entry.
//!
//! Wires the config loader, the metrics registry, the scrape orchestrator and
//! the HTTP surface together. It is consumed by the binary (`main.rs`) and by
//! integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod router;
pub mod scrape;
