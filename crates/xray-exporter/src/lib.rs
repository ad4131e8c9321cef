//! Top-level facade crate for xray-exporter.
//!
//! Re-exports the core types and the bridge library so users can depend on a single crate.

pub mod core {
    pub use xray_exporter_core::*;
}

pub mod bridge {
    pub use xray_exporter_bridge::*;
}
