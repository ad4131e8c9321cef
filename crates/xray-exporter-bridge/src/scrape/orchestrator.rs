use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;

use xray_exporter_core::error::Result;
use xray_exporter_core::vars::DebugVars;

use crate::config::{InstanceConfig, ScrapeSection};
use crate::obs::metrics::{BridgeMetrics, GaugeVec};

use super::source::StatsSource;

/// Reshaping rules applied to every snapshot.
#[derive(Debug, Clone)]
pub struct ScrapePolicy {
    /// Delays strictly above this are probe-timeout artifacts.
    pub delay_threshold_ms: f64,
    /// Recorded in place of such delays.
    pub delay_sentinel: f64,
    /// `None` exports every inbound tag.
    pub inbound_allowlist: Option<HashSet<String>>,
}

impl Default for ScrapePolicy {
    fn default() -> Self {
        Self::from_section(&ScrapeSection::default())
    }
}

impl ScrapePolicy {
    pub fn from_section(s: &ScrapeSection) -> Self {
        Self {
            delay_threshold_ms: s.delay_threshold_ms,
            delay_sentinel: s.delay_sentinel,
            inbound_allowlist: s
                .inbound_allowlist
                .as_ref()
                .map(|tags| tags.iter().cloned().collect()),
        }
    }

    pub fn delay(&self, raw_ms: f64) -> f64 {
        if raw_ms > self.delay_threshold_ms {
            self.delay_sentinel
        } else {
            raw_ms
        }
    }

    pub fn exports_inbound(&self, tag: &str) -> bool {
        match &self.inbound_allowlist {
            None => true,
            Some(allowed) => allowed.contains(tag),
        }
    }
}

/// Result of polling one instance, tagged with the instance it belongs to.
pub struct InstanceOutcome<'a> {
    pub instance: &'a InstanceConfig,
    pub elapsed: Duration,
    pub result: Result<DebugVars>,
}

/// Drives one scrape: fan out, refill gauges, render.
pub struct Scraper {
    instances: Vec<InstanceConfig>,
    source: Arc<dyn StatsSource>,
    metrics: Arc<BridgeMetrics>,
    policy: ScrapePolicy,
}

impl Scraper {
    pub fn new(
        instances: Vec<InstanceConfig>,
        source: Arc<dyn StatsSource>,
        metrics: Arc<BridgeMetrics>,
        policy: ScrapePolicy,
    ) -> Self {
        Self { instances, source, metrics, policy }
    }

    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    /// Run one full cycle and return the exposition body.
    pub async fn scrape(&self) -> String {
        let started = Instant::now();
        let outcomes = self.poll_all().await;
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        self.apply(&outcomes);

        tracing::debug!(
            instances = outcomes.len(),
            failed,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "scrape finished"
        );
        self.metrics.render()
    }

    /// Poll every instance concurrently. Never short-circuits on a failure.
    pub async fn poll_all(&self) -> Vec<InstanceOutcome<'_>> {
        let polls = self.instances.iter().map(|instance| async move {
            let t0 = Instant::now();
            let result = self.source.fetch(instance).await;
            InstanceOutcome { instance, elapsed: t0.elapsed(), result }
        });
        join_all(polls).await
    }

    /// Reset per-tag series, then refill them from `outcomes` and set liveness.
    pub fn apply(&self, outcomes: &[InstanceOutcome<'_>]) {
        let m = &*self.metrics;
        m.reset_tagged();

        for o in outcomes {
            let server = o.instance.server.as_str();
            m.scrape_duration.set(&[server], o.elapsed.as_secs_f64());

            match &o.result {
                Ok(vars) => {
                    self.record(server, vars);
                    m.server_up.set(&[server], 1.0);
                }
                Err(e) => {
                    tracing::warn!(server = %server, host = %o.instance.host, error = %e, "poll failed, marking server down");
                    let kind = e.fetch_kind().map(|k| k.as_str()).unwrap_or("internal");
                    m.scrape_errors.inc(&[server, kind]);
                    m.server_up.set(&[server], 0.0);
                }
            }
        }
    }

    fn record(&self, server: &str, vars: &DebugVars) {
        let m = &*self.metrics;

        for (tag, t) in &vars.stats.inbound {
            if !self.policy.exports_inbound(tag) {
                continue;
            }
            set_pair(&m.inbound_downlink, &m.inbound_uplink, tag, server, t.downlink, t.uplink);
        }
        for (tag, t) in &vars.stats.outbound {
            set_pair(&m.outbound_downlink, &m.outbound_uplink, tag, server, t.downlink, t.uplink);
        }
        for (key, probe) in &vars.observatory {
            m.observatory_delay
                .set(&[probe.tag(key), server], self.policy.delay(probe.delay));
        }
    }
}

fn set_pair(down: &GaugeVec, up: &GaugeVec, tag: &str, server: &str, d: f64, u: f64) {
    down.set(&[tag, server], d);
    up.set(&[tag, server], u);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use xray_exporter_core::error::{ExporterError, FetchErrorKind};
    use xray_exporter_core::vars::{ObservatoryEntry, Traffic};

    /// Scripted per-server answers, swappable between scrapes.
    #[derive(Default)]
    struct ScriptedSource {
        answers: Mutex<HashMap<String, std::result::Result<DebugVars, FetchErrorKind>>>,
    }

    impl ScriptedSource {
        fn answer(&self, server: &str, a: std::result::Result<DebugVars, FetchErrorKind>) {
            self.answers.lock().unwrap().insert(server.to_string(), a);
        }
    }

    #[async_trait]
    impl StatsSource for ScriptedSource {
        async fn fetch(&self, instance: &InstanceConfig) -> Result<DebugVars> {
            match self.answers.lock().unwrap().get(&instance.server) {
                Some(Ok(v)) => Ok(v.clone()),
                Some(Err(kind)) => Err(ExporterError::fetch(&instance.server, *kind, "scripted")),
                None => Err(ExporterError::fetch(&instance.server, FetchErrorKind::Transport, "no answer")),
            }
        }
    }

    fn inst(server: &str) -> InstanceConfig {
        InstanceConfig { server: server.into(), host: format!("http://{server}.invalid") }
    }

    fn vars(inbound: &[(&str, f64, f64)], probes: &[(&str, f64)]) -> DebugVars {
        let mut v = DebugVars::default();
        for (tag, d, u) in inbound {
            v.stats.inbound.insert(tag.to_string(), Traffic { downlink: *d, uplink: *u });
        }
        for (tag, delay) in probes {
            v.observatory.insert(
                tag.to_string(),
                ObservatoryEntry { delay: *delay, outbound_tag: tag.to_string() },
            );
        }
        v
    }

    fn scraper(servers: &[&str], policy: ScrapePolicy) -> (Scraper, Arc<ScriptedSource>) {
        let source = Arc::new(ScriptedSource::default());
        let s = Scraper::new(
            servers.iter().map(|s| inst(s)).collect(),
            source.clone(),
            Arc::new(BridgeMetrics::default()),
            policy,
        );
        (s, source)
    }

    #[tokio::test]
    async fn liveness_follows_fetch_result() {
        let (s, src) = scraper(&["a", "b"], ScrapePolicy::default());
        src.answer("a", Ok(vars(&[("vmess0", 100.0, 50.0)], &[])));
        src.answer("b", Err(FetchErrorKind::Timeout));

        let body = s.scrape().await;

        assert_eq!(s.metrics().server_up.get(&["a"]), Some(1.0));
        assert_eq!(s.metrics().server_up.get(&["b"]), Some(0.0));
        assert_eq!(s.metrics().scrape_errors.get(&["b", "timeout"]), 1);
        assert!(body.contains("xray_traffic_inbound_downlink_bytes_total{tag=\"vmess0\",server=\"a\"} 100\n"));
        assert!(body.contains("xray_traffic_inbound_uplink_bytes_total{tag=\"vmess0\",server=\"a\"} 50\n"));
        assert!(body.contains("xray_server_up{server=\"b\"} 0\n"));
    }

    #[tokio::test]
    async fn stale_tags_are_dropped_on_next_scrape() {
        let (s, src) = scraper(&["a"], ScrapePolicy::default());
        src.answer("a", Ok(vars(&[("x", 1.0, 1.0), ("y", 2.0, 2.0)], &[])));
        let first = s.scrape().await;
        assert!(first.contains("tag=\"x\",server=\"a\""));

        src.answer("a", Ok(vars(&[("y", 3.0, 3.0)], &[])));
        let second = s.scrape().await;
        assert!(!second.contains("tag=\"x\""));
        assert!(second.contains("xray_traffic_inbound_downlink_bytes_total{tag=\"y\",server=\"a\"} 3\n"));
    }

    #[tokio::test]
    async fn failed_instance_loses_its_tagged_series() {
        let (s, src) = scraper(&["a"], ScrapePolicy::default());
        src.answer("a", Ok(vars(&[("x", 1.0, 1.0)], &[("p", 10.0)])));
        s.scrape().await;

        src.answer("a", Err(FetchErrorKind::Decode));
        let body = s.scrape().await;
        assert!(!body.contains("tag=\"x\""));
        assert!(!body.contains("tag=\"p\""));
        assert_eq!(s.metrics().server_up.get(&["a"]), Some(0.0));
    }

    #[tokio::test]
    async fn large_delay_becomes_sentinel() {
        let policy = ScrapePolicy { delay_sentinel: -500.0, ..ScrapePolicy::default() };
        let (s, src) = scraper(&["a"], policy);
        src.answer("a", Ok(vars(&[], &[("slow", 15000.0), ("fast", 9999.0), ("edge", 10000.0)])));

        s.scrape().await;

        let d = &s.metrics().observatory_delay;
        assert_eq!(d.get(&["slow", "a"]), Some(-500.0));
        assert_eq!(d.get(&["fast", "a"]), Some(9999.0));
        assert_eq!(d.get(&["edge", "a"]), Some(10000.0));
    }

    #[tokio::test]
    async fn allowlist_filters_inbound_only() {
        let policy = ScrapePolicy {
            inbound_allowlist: Some(["tproxy".to_string()].into_iter().collect()),
            ..ScrapePolicy::default()
        };
        let (s, src) = scraper(&["a"], policy);
        let mut v = vars(&[("tproxy", 5.0, 6.0), ("api", 1.0, 1.0)], &[]);
        v.stats.outbound.insert("direct".into(), Traffic { downlink: 7.0, uplink: 8.0 });
        src.answer("a", Ok(v));

        s.scrape().await;

        let m = s.metrics();
        assert_eq!(m.inbound_downlink.get(&["tproxy", "a"]), Some(5.0));
        assert_eq!(m.inbound_downlink.get(&["api", "a"]), None);
        assert_eq!(m.outbound_uplink.get(&["direct", "a"]), Some(8.0));
    }

    #[tokio::test]
    async fn every_instance_is_polled_once() {
        let (s, src) = scraper(&["a", "b", "c"], ScrapePolicy::default());
        src.answer("b", Ok(DebugVars::default()));

        let outcomes = s.poll_all().await;
        let servers: Vec<&str> = outcomes.iter().map(|o| o.instance.server.as_str()).collect();
        assert_eq!(servers, ["a", "b", "c"]);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 1);
    }
}
