//! Poll-aggregate-reset-expose cycle.
//!
//! - `source`: how one instance's `/debug/vars` is fetched (HTTP in production).
//! - `orchestrator`: fan-out over instances, gauge refill, liveness, render.

pub mod orchestrator;
pub mod source;

pub use orchestrator::{InstanceOutcome, ScrapePolicy, Scraper};
pub use source::{HttpStatsSource, StatsSource};
