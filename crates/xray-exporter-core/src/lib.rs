//! xray-exporter core: error types and the upstream `/debug/vars` payload model.
//!
//! This crate carries no transport or runtime dependencies so the decoding
//! rules can be exercised in isolation from the HTTP bridge.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! A malformed upstream document surfaces as `ExporterError`, never as a
//! crash of the scrape handler.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod vars;

/// Shared result type.
pub use error::{ExporterError, FetchErrorKind, Result};
