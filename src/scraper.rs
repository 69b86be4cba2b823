//! Scrape Orchestrator
//!
//! One independent loop per target:
//!
//! ```text
//! Connecting ──► Authenticated ──► Scraping ⇄ Sleeping
//!     ▲                               │
//!     └──────── Backoff ◄─────────────┘  (connection-level fault)
//! ```
//!
//! Every cycle rebuilds the topology first, then runs the target's topics in
//! order, enriches each batch with the static and per-topic tags, and hands it to
//! every sink. Cancellation is observed at the top of each cycle and while
//! sleeping or backing off.
//!
//! # Error Handling
//!
//! - Connection-level faults drop the session and wait a doubling delay before
//!   reconnecting; a successful login resets the delay.
//! - Data-level faults and empty topologies are logged; the loop carries on.
//! - Anything else ends that target's loop with the error. Other targets are
//!   unaffected.

use crate::collectors::{self, enrich, CollectionContext, Topic};
use crate::config::{BackoffConfig, Config, TargetConfig};
use crate::error::{ExporterError, Result};
use crate::fortiadc::FadcClient;
use crate::metrics::MetricsCollector;
use crate::sinks::{self, Dispatcher, SharedSink};
use crate::topology::NameFilter;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Doubling reconnect delay, capped at `max`
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial(), config.max())
    }

    /// Delay to wait now; the following call returns twice as much
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

/// What one successful cycle produced
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub virtual_servers: usize,
    /// Follow-up queries issued across all topics
    pub queries: usize,
    /// Records dispatched per measurement, in topic order
    pub records: Vec<(&'static str, usize)>,
    pub sink_failures: usize,
}

impl CycleReport {
    pub fn total_records(&self) -> usize {
        self.records.iter().map(|(_, n)| n).sum()
    }

    /// False when queries were issued but every one of them was dropped
    pub fn produced_data(&self) -> bool {
        self.queries == 0 || self.total_records() > 0
    }
}

pub struct TargetScraper {
    target: TargetConfig,
    client: FadcClient,
    sinks: Vec<SharedSink>,
    metrics: MetricsCollector,
    backoff: Backoff,
    filter: NameFilter,
    static_tags: BTreeMap<String, String>,
}

impl TargetScraper {
    pub fn new(
        target: TargetConfig,
        sinks: Vec<SharedSink>,
        metrics: MetricsCollector,
        backoff: Backoff,
    ) -> Result<Self> {
        let client = FadcClient::new(&target)?;
        let filter = target.name_filter();
        let static_tags = target.static_tags();

        Ok(Self {
            target,
            client,
            sinks,
            metrics,
            backoff,
            filter,
            static_tags,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.target.hostname
    }

    pub fn client(&self) -> &FadcClient {
        &self.client
    }

    /// Run one scrape cycle against an authenticated session.
    ///
    /// # Errors
    ///
    /// - [`ExporterError::EmptyTopology`] when no virtual server survives the
    ///   name filter; nothing is dispatched in that case
    /// - Connection-level errors from the tree fetch or from a topic whose every
    ///   query failed
    pub async fn scrape_once(&self) -> Result<CycleReport> {
        let hostname = self.hostname();
        let topology =
            collectors::collect_topology(&self.client, &self.target.vdom, &self.filter).await?;

        let virtual_servers = topology.virtual_servers().count();
        self.metrics
            .set_gauge(&self.metrics.virtual_servers, &[hostname], virtual_servers as f64);

        if topology.is_empty() {
            warn!(
                host = %hostname,
                "No virtual servers found (filter: {:?}); skipping this cycle",
                self.target.vs_filter
            );
            return Err(ExporterError::EmptyTopology(format!(
                "{} reported no matching virtual servers",
                hostname
            )));
        }

        let ctx = CollectionContext {
            client: &self.client,
            topology: &topology,
            vdom: &self.target.vdom,
        };
        let mut dispatcher = Dispatcher::new(&self.sinks);
        let mut report = CycleReport {
            virtual_servers,
            ..Default::default()
        };

        for scrape_config in &self.target.scrape_configs {
            let topic = scrape_config.topic;
            let measurement = topic.measurement();
            report.queries += match topic {
                Topic::VsStatus | Topic::VsHttpStats => virtual_servers,
                Topic::RsStatus => topology.leaf_count(),
            };

            let mut records = collectors::collect_topic(&ctx, topic).await?;
            enrich(&mut records, &self.static_tags);
            enrich(&mut records, &scrape_config.tags);

            info!(
                host = %hostname,
                "Writing {} {} records",
                records.len(),
                measurement
            );
            let failures = dispatcher.dispatch(&records, measurement).await;
            for e in &failures {
                self.metrics.record_error(hostname, e.kind());
            }
            report.sink_failures += failures.len();

            self.metrics
                .record_dispatch(hostname, measurement, records.len());
            report.records.push((measurement, records.len()));
        }

        if dispatcher.failed_sinks() > 0 {
            warn!(
                host = %hostname,
                "{} of {} sinks failed during this cycle",
                dispatcher.failed_sinks(),
                self.sinks.len()
            );
        }

        Ok(report)
    }

    /// Scrape until cancelled or a fatal error occurs
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let outcome = self.run_loop(&cancel).await;
        self.client.close().await;
        self.metrics.set_up(self.hostname(), false);

        if let Err(e) = &outcome {
            error!(host = %self.hostname(), "Scrape loop stopped: {}", e);
        }
        outcome
    }

    async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<()> {
        let interval = self.target.scrape_interval();
        let mut first_cycle = true;

        loop {
            if cancel.is_cancelled() {
                info!(host = %self.hostname(), "Cancelled, stopping scrape loop");
                return Ok(());
            }

            if !self.client.is_authenticated().await {
                match self.client.authenticate().await {
                    Ok(()) => {
                        self.backoff.reset();
                        self.metrics
                            .set_gauge(&self.metrics.backoff_seconds, &[self.hostname()], 0.0);
                    }
                    Err(e) if e.is_connection_level() => {
                        if !self.back_off(&e, cancel).await {
                            return Ok(());
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let started = Instant::now();
            let outcome = self.scrape_once().await;
            self.metrics.set_gauge(
                &self.metrics.scrape_duration_seconds,
                &[self.hostname()],
                started.elapsed().as_secs_f64(),
            );

            match outcome {
                Ok(report) if !report.produced_data() => {
                    warn!(
                        host = %self.hostname(),
                        "All {} queries of this cycle failed; no records written",
                        report.queries
                    );
                    self.metrics.set_up(self.hostname(), false);
                    self.metrics.record_error(self.hostname(), "no_records");
                }
                Ok(report) => {
                    self.metrics.set_up(self.hostname(), true);
                    debug!(
                        host = %self.hostname(),
                        "Cycle complete: {} virtual servers, {} records in {:?}",
                        report.virtual_servers,
                        report.total_records(),
                        started.elapsed()
                    );
                }
                Err(e) if e.is_connection_level() => {
                    self.client.close().await;
                    if !self.back_off(&e, cancel).await {
                        return Ok(());
                    }
                    continue;
                }
                Err(e @ ExporterError::EmptyTopology(_)) => {
                    self.metrics.set_up(self.hostname(), false);
                    self.metrics.record_error(self.hostname(), e.kind());
                    if first_cycle && self.target.fail_on_empty_topology {
                        return Err(e);
                    }
                }
                Err(e) if e.is_data_level() => {
                    warn!(host = %self.hostname(), "Scrape cycle incomplete: {}", e);
                    self.metrics.set_up(self.hostname(), false);
                    self.metrics.record_error(self.hostname(), e.kind());
                }
                Err(e) => {
                    self.metrics.record_error(self.hostname(), e.kind());
                    return Err(e);
                }
            }

            first_cycle = false;
            debug!(host = %self.hostname(), "Sleeping {:?}", interval);
            if !sleep_or_cancel(cancel, interval).await {
                info!(host = %self.hostname(), "Cancelled, stopping scrape loop");
                return Ok(());
            }
        }
    }

    /// Wait out the next backoff delay; false if cancelled meanwhile
    async fn back_off(&mut self, cause: &ExporterError, cancel: &CancellationToken) -> bool {
        let delay = self.backoff.next_delay();
        let hostname = self.target.hostname.as_str();

        self.metrics.set_up(hostname, false);
        self.metrics.record_error(hostname, cause.kind());
        self.metrics
            .set_gauge(&self.metrics.backoff_seconds, &[hostname], delay.as_secs_f64());

        warn!(
            host = %hostname,
            "{}; reconnecting in {} seconds",
            cause,
            delay.as_secs()
        );
        sleep_or_cancel(cancel, delay).await
    }
}

/// Sleep for `delay`; returns false if `cancel` fired first
pub async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// How the target loops ended
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Hostnames of targets whose loop ended with an error
    pub failed_targets: Vec<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed_targets.is_empty()
    }
}

/// Build the configured sinks and scrape every target until cancelled
pub async fn run(
    config: &Config,
    metrics: MetricsCollector,
    cancel: CancellationToken,
) -> anyhow::Result<RunSummary> {
    let sinks = sinks::build_sinks(&config.writers)?;
    run_with_sinks(config, sinks, metrics, cancel).await
}

/// Scrape every target with an already built set of sinks.
///
/// The sinks are initialised first and closed once every target loop has
/// exited, whether by cancellation or error.
pub async fn run_with_sinks(
    config: &Config,
    sinks: Vec<SharedSink>,
    metrics: MetricsCollector,
    cancel: CancellationToken,
) -> anyhow::Result<RunSummary> {
    sinks::initialize_all(&sinks).await?;

    let mut summary = RunSummary::default();
    let mut handles = Vec::with_capacity(config.targets.len());

    for target in &config.targets {
        let hostname = target.hostname.clone();
        let scraper = match TargetScraper::new(
            target.clone(),
            sinks.clone(),
            metrics.clone(),
            Backoff::from_config(&config.backoff),
        ) {
            Ok(scraper) => scraper,
            Err(e) => {
                error!(host = %hostname, "Failed to set up target: {}", e);
                summary.failed_targets.push(hostname);
                continue;
            }
        };

        info!(
            host = %hostname,
            "Scraping {} every {}s ({} topics)",
            target.base_url,
            target.scrape_interval,
            target.scrape_configs.len()
        );
        let cancel = cancel.clone();
        handles.push((hostname, tokio::spawn(scraper.run(cancel))));
    }

    for (hostname, handle) in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => summary.failed_targets.push(hostname),
            Err(e) => {
                error!(host = %hostname, "Scrape task panicked: {}", e);
                summary.failed_targets.push(hostname);
            }
        }
    }

    sinks::close_all(&sinks).await;
    Ok(summary)
}
