//! Labeled gauge/counter vectors and the bridge's metric families.
//!
//! Each vector declares its label names once; samples are keyed by the label
//! values in that order, so `{tag="vmess0",server="a"}` renders exactly as
//! declared. Rendering sorts series to keep the output deterministic.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Helper to escape HELP text.
fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf".into() } else { "-Inf".into() }
    } else {
        format!("{v}")
    }
}

fn label_key(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn render_header(name: &str, help: &str, ty: &str, out: &mut String) {
    let _ = writeln!(out, "# HELP {} {}", name, escape_help(help));
    let _ = writeln!(out, "# TYPE {} {}", name, ty);
}

fn render_sample(name: &str, label_names: &[&'static str], values: &[String], v: &str, out: &mut String) {
    let label_str = label_names
        .iter()
        .zip(values)
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",");
    if label_str.is_empty() {
        let _ = writeln!(out, "{} {}", name, v);
    } else {
        let _ = writeln!(out, "{}{{{}}} {}", name, label_str, v);
    }
}

pub struct GaugeVec {
    name: String,
    help: &'static str,
    label_names: Vec<&'static str>,
    // f64 bit patterns
    map: DashMap<Vec<String>, AtomicU64>,
}

impl GaugeVec {
    pub fn new(name: impl Into<String>, help: &'static str, label_names: &[&'static str]) -> Self {
        Self {
            name: name.into(),
            help,
            label_names: label_names.to_vec(),
            map: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the series for `values` (ordered like the declared label names).
    pub fn set(&self, values: &[&str], v: f64) {
        debug_assert_eq!(values.len(), self.label_names.len(), "label arity for {}", self.name);
        let gauge = self.map.entry(label_key(values)).or_insert_with(|| AtomicU64::new(0));
        gauge.store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self, values: &[&str]) -> Option<f64> {
        self.map
            .get(&label_key(values))
            .map(|g| f64::from_bits(g.load(Ordering::Relaxed)))
    }

    /// Drop every series.
    pub fn reset(&self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Render in Prometheus text exposition format.
    fn render(&self, out: &mut String) {
        render_header(&self.name, self.help, "gauge", out);
        let mut rows: Vec<(Vec<String>, f64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), f64::from_bits(r.value().load(Ordering::Relaxed))))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        for (values, v) in rows {
            render_sample(&self.name, &self.label_names, &values, &format_value(v), out);
        }
    }
}

pub struct CounterVec {
    name: String,
    help: &'static str,
    label_names: Vec<&'static str>,
    map: DashMap<Vec<String>, AtomicU64>,
}

impl CounterVec {
    pub fn new(name: impl Into<String>, help: &'static str, label_names: &[&'static str]) -> Self {
        Self {
            name: name.into(),
            help,
            label_names: label_names.to_vec(),
            map: DashMap::new(),
        }
    }

    /// Increment by 1.
    pub fn inc(&self, values: &[&str]) {
        self.add(values, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, values: &[&str], v: u64) {
        let counter = self.map.entry(label_key(values)).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, values: &[&str]) -> u64 {
        self.map
            .get(&label_key(values))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render in Prometheus text exposition format.
    fn render(&self, out: &mut String) {
        render_header(&self.name, self.help, "counter", out);
        let mut rows: Vec<(Vec<String>, u64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        for (values, v) in rows {
            render_sample(&self.name, &self.label_names, &values, &v.to_string(), out);
        }
    }
}

/// Every family the bridge exports.
pub struct BridgeMetrics {
    pub inbound_downlink: GaugeVec,
    pub inbound_uplink: GaugeVec,
    pub outbound_downlink: GaugeVec,
    pub outbound_uplink: GaugeVec,
    pub observatory_delay: GaugeVec,
    pub server_up: GaugeVec,
    pub scrape_duration: GaugeVec, // In Seconds
    pub scrape_errors: CounterVec,
}

impl BridgeMetrics {
    pub fn new(namespace: &str) -> Self {
        let ns = namespace;
        Self {
            inbound_downlink: GaugeVec::new(
                format!("{ns}_traffic_inbound_downlink_bytes_total"),
                "downlink traffic of inbound",
                &["tag", "server"],
            ),
            inbound_uplink: GaugeVec::new(
                format!("{ns}_traffic_inbound_uplink_bytes_total"),
                "uplink traffic of inbound",
                &["tag", "server"],
            ),
            outbound_downlink: GaugeVec::new(
                format!("{ns}_traffic_outbound_downlink_bytes_total"),
                "downlink traffic of outbound",
                &["tag", "server"],
            ),
            outbound_uplink: GaugeVec::new(
                format!("{ns}_traffic_outbound_uplink_bytes_total"),
                "uplink traffic of outbound",
                &["tag", "server"],
            ),
            observatory_delay: GaugeVec::new(
                format!("{ns}_observatory_delay_millisecond"),
                "observatory result of outbound, the unit is millisecond",
                &["tag", "server"],
            ),
            server_up: GaugeVec::new(format!("{ns}_server_up"), "xray server up state", &["server"]),
            scrape_duration: GaugeVec::new(
                format!("{ns}_scrape_duration_seconds"),
                "time spent polling the debug vars endpoint of a server",
                &["server"],
            ),
            scrape_errors: CounterVec::new(
                format!("{ns}_scrape_errors_total"),
                "failed polls of a server by failure kind",
                &["server", "kind"],
            ),
        }
    }

    /// Clear the per-tag families. Liveness and bridge self-metrics are kept.
    pub fn reset_tagged(&self) {
        self.inbound_downlink.reset();
        self.inbound_uplink.reset();
        self.outbound_downlink.reset();
        self.outbound_uplink.reset();
        self.observatory_delay.reset();
    }

    /// Render all families.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.inbound_downlink.render(&mut out);
        self.inbound_uplink.render(&mut out);
        self.outbound_downlink.render(&mut out);
        self.outbound_uplink.render(&mut out);
        self.observatory_delay.render(&mut out);
        self.server_up.render(&mut out);
        self.scrape_duration.render(&mut out);
        self.scrape_errors.render(&mut out);
        out
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new("xray")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_render_in_declared_order() {
        let g = GaugeVec::new("xray_traffic_inbound_downlink_bytes_total", "h", &["tag", "server"]);
        g.set(&["vmess0", "tokyo"], 100.0);
        let mut out = String::new();
        g.render(&mut out);
        assert!(out.contains("xray_traffic_inbound_downlink_bytes_total{tag=\"vmess0\",server=\"tokyo\"} 100\n"));
        assert!(out.contains("# TYPE xray_traffic_inbound_downlink_bytes_total gauge\n"));
    }

    #[test]
    fn set_overwrites_and_reset_clears() {
        let g = GaugeVec::new("g", "h", &["server"]);
        g.set(&["a"], 1.0);
        g.set(&["a"], 0.0);
        assert_eq!(g.get(&["a"]), Some(0.0));
        g.reset();
        assert!(g.is_empty());
        assert_eq!(g.get(&["a"]), None);
    }

    #[test]
    fn special_values_and_escaping() {
        let g = GaugeVec::new("g", "h", &["tag"]);
        g.set(&["say \"hi\""], f64::INFINITY);
        g.set(&["neg"], -500.0);
        let mut out = String::new();
        g.render(&mut out);
        assert!(out.contains("g{tag=\"say \\\"hi\\\"\"} +Inf\n"));
        assert!(out.contains("g{tag=\"neg\"} -500\n"));
    }

    #[test]
    fn reset_tagged_keeps_liveness() {
        let m = BridgeMetrics::default();
        m.inbound_downlink.set(&["x", "a"], 1.0);
        m.observatory_delay.set(&["p", "a"], 20.0);
        m.server_up.set(&["a"], 1.0);
        m.scrape_errors.inc(&["b", "timeout"]);
        m.reset_tagged();
        assert!(m.inbound_downlink.is_empty());
        assert!(m.observatory_delay.is_empty());
        assert_eq!(m.server_up.get(&["a"]), Some(1.0));
        assert_eq!(m.scrape_errors.get(&["b", "timeout"]), 1);
    }

    #[test]
    fn rendering_is_sorted() {
        let g = GaugeVec::new("g", "h", &["server"]);
        g.set(&["b"], 2.0);
        g.set(&["a"], 1.0);
        let mut out = String::new();
        g.render(&mut out);
        let a = out.find("server=\"a\"").unwrap_or(usize::MAX);
        let b = out.find("server=\"b\"").unwrap_or(0);
        assert!(a < b);
    }
}
