//! Output Sinks
//!
//! A sink receives one batch of enriched records per topic per scrape cycle,
//! together with the batch's measurement label. Every sink serialises its own
//! writes, so targets sharing a sink never interleave two batches inside one
//! message.
//!
//! Both built-in sinks emit the same envelope:
//!
//! ```json
//! {"measurement": "virtualServerStatus", "metrics": [ ... ]}
//! ```

use crate::collectors::Record;
use crate::config::WriterConfig;
use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub mod console;
pub mod http;

pub use console::ConsoleSink;
pub use http::HttpSink;

#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare the transport; calling it again is a no-op
    async fn initialize(&self) -> Result<()>;

    async fn write(&self, records: &[Record], measurement: &str) -> Result<()>;

    /// Flush and release the transport
    async fn close(&self) -> Result<()>;
}

pub type SharedSink = Arc<dyn Sink>;

pub fn envelope(records: &[Record], measurement: &str) -> serde_json::Value {
    serde_json::json!({
        "measurement": measurement,
        "metrics": records,
    })
}

pub fn build_sinks(writers: &[WriterConfig]) -> Result<Vec<SharedSink>> {
    writers
        .iter()
        .map(|writer| -> Result<SharedSink> {
            match writer {
                WriterConfig::Stdout => Ok(Arc::new(ConsoleSink::stdout())),
                WriterConfig::Http {
                    url,
                    timeout_seconds,
                } => Ok(Arc::new(HttpSink::new(
                    url.clone(),
                    Duration::from_secs(*timeout_seconds),
                )?)),
            }
        })
        .collect()
}

pub async fn initialize_all(sinks: &[SharedSink]) -> Result<()> {
    for sink in sinks {
        sink.initialize().await?;
        debug!("Initialized sink {}", sink.name());
    }
    Ok(())
}

/// Close every sink, logging (not propagating) individual failures
pub async fn close_all(sinks: &[SharedSink]) {
    info!("Closing writers...");
    for sink in sinks {
        if let Err(e) = sink.close().await {
            error!("Failed to close sink {}: {}", sink.name(), e);
        }
    }
    info!("Writers closed.");
}

/// Fans batches out to every sink for the duration of one scrape cycle.
///
/// A sink whose write fails is skipped for the rest of the cycle; the other
/// sinks keep receiving batches.
pub struct Dispatcher<'a> {
    sinks: &'a [SharedSink],
    failed: Vec<bool>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(sinks: &'a [SharedSink]) -> Self {
        Self {
            sinks,
            failed: vec![false; sinks.len()],
        }
    }

    /// Write one batch; returns the errors of sinks that failed on it
    pub async fn dispatch(&mut self, records: &[Record], measurement: &str) -> Vec<ExporterError> {
        let mut errors = Vec::new();

        for (sink, failed) in self.sinks.iter().zip(self.failed.iter_mut()) {
            if *failed {
                debug!(
                    "Skipping {} for {} after an earlier failure this cycle",
                    sink.name(),
                    measurement
                );
                continue;
            }
            match sink.write(records, measurement).await {
                Ok(()) => debug!(
                    "Wrote {} {} records to {}",
                    records.len(),
                    measurement,
                    sink.name()
                ),
                Err(e) => {
                    warn!("Sink {} failed writing {}: {}", sink.name(), measurement, e);
                    *failed = true;
                    errors.push(e);
                }
            }
        }
        errors
    }

    pub fn failed_sinks(&self) -> usize {
        self.failed.iter().filter(|f| **f).count()
    }
}
