//! In-process metrics registry for the bridge.
//!
//! Series are stored in `DashMap`s and rendered in Prometheus text format by
//! the `/metrics` handler. The registry is an owned value in `AppState`, not
//! a process-wide singleton.

pub mod metrics;
