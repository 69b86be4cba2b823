//! Exporter Self-Metrics
//!
//! Prometheus metrics describing the scraper itself (not the appliance data,
//! which goes to the configured sinks).
//!
//! # Metrics
//!
//! - `fadc_exporter_target_up` - 1 after a cycle that wrote records (or had nothing
//!   to query), 0 otherwise
//! - `fadc_exporter_scrape_duration_seconds` - duration of the last cycle
//! - `fadc_exporter_virtual_servers` - virtual servers discovered (after filtering)
//! - `fadc_exporter_records_total` - records dispatched, by measurement
//! - `fadc_exporter_scrape_errors_total` - cycle failures, by error kind
//! - `fadc_exporter_backoff_seconds` - current reconnect delay (0 when connected)
//!
//! All metrics carry a `target` label with the target's hostname and use the
//! `fadc_exporter_` namespace prefix.

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,

    pub target_up: Arc<GaugeVec>,
    pub scrape_duration_seconds: Arc<GaugeVec>,
    pub virtual_servers: Arc<GaugeVec>,
    pub backoff_seconds: Arc<GaugeVec>,
    pub records_total: Arc<IntCounterVec>,
    pub scrape_errors_total: Arc<IntCounterVec>,

    // last known up state per target, mirrors `target_up`
    up: Arc<RwLock<BTreeMap<String, bool>>>,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let target_up = GaugeVec::new(
            Opts::new(
                "target_up",
                "Whether the last scrape cycle of the target succeeded (1=up, 0=down)",
            )
            .namespace("fadc_exporter"),
            &["target"],
        )?;

        let scrape_duration_seconds = GaugeVec::new(
            Opts::new(
                "scrape_duration_seconds",
                "Duration of the last scrape cycle",
            )
            .namespace("fadc_exporter"),
            &["target"],
        )?;

        let virtual_servers = GaugeVec::new(
            Opts::new(
                "virtual_servers",
                "Virtual servers discovered in the last cycle after name filtering",
            )
            .namespace("fadc_exporter"),
            &["target"],
        )?;

        let backoff_seconds = GaugeVec::new(
            Opts::new("backoff_seconds", "Current reconnect backoff delay")
                .namespace("fadc_exporter"),
            &["target"],
        )?;

        let records_total = IntCounterVec::new(
            Opts::new("records_total", "Records dispatched to sinks").namespace("fadc_exporter"),
            &["target", "measurement"],
        )?;

        let scrape_errors_total = IntCounterVec::new(
            Opts::new("scrape_errors_total", "Scrape cycle failures by error kind")
                .namespace("fadc_exporter"),
            &["target", "kind"],
        )?;

        registry.register(Box::new(target_up.clone()))?;
        registry.register(Box::new(scrape_duration_seconds.clone()))?;
        registry.register(Box::new(virtual_servers.clone()))?;
        registry.register(Box::new(backoff_seconds.clone()))?;
        registry.register(Box::new(records_total.clone()))?;
        registry.register(Box::new(scrape_errors_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            target_up: Arc::new(target_up),
            scrape_duration_seconds: Arc::new(scrape_duration_seconds),
            virtual_servers: Arc::new(virtual_servers),
            backoff_seconds: Arc::new(backoff_seconds),
            records_total: Arc::new(records_total),
            scrape_errors_total: Arc::new(scrape_errors_total),
            up: Arc::new(RwLock::new(BTreeMap::new())),
        })
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Helper to set a gauge value with labels
    pub fn set_gauge(&self, gauge: &GaugeVec, labels: &[&str], value: f64) {
        gauge.with_label_values(labels).set(value);
    }

    pub fn set_up(&self, target: &str, up: bool) {
        self.set_gauge(&self.target_up, &[target], if up { 1.0 } else { 0.0 });
        self.up
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(target.to_string(), up);
    }

    pub fn record_error(&self, target: &str, kind: &str) {
        self.scrape_errors_total
            .with_label_values(&[target, kind])
            .inc();
    }

    pub fn record_dispatch(&self, target: &str, measurement: &str, records: usize) {
        self.records_total
            .with_label_values(&[target, measurement])
            .inc_by(records as u64);
    }

    /// True if at least one target completed its last cycle successfully
    pub fn any_target_up(&self) -> bool {
        self.up
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .any(|up| *up)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics collector")
    }
}
