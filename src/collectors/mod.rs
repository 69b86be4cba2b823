//! Correlation Collectors
//!
//! Each collector turns the freshly built [`Topology`] into one bulk fetch against
//! the appliance and correlates every response with the topology object it was
//! issued for.
//!
//! # Architecture
//!
//! Collectors follow a consistent pattern:
//! - Build one [`ApiQuery`](crate::fortiadc::ApiQuery) per topology object, keyed by
//!   that object (so no separate list has to be zipped back later)
//! - Run them through [`FadcClient::bulk_get`]
//! - Take one timestamp for the whole batch
//! - Attach `tags`, `@timestamp` and, for status topics, `health`
//! - Hand the per-slot outcomes to [`finish_batch`]
//!
//! # Error Handling
//!
//! A failed slot is logged and its record dropped; the rest of the batch is kept.
//! Only when every slot failed on a connection-level fault does the collector
//! return an error, so the scrape loop can back off.

use crate::error::{ExporterError, Result};
use crate::fortiadc::FadcClient;
use crate::topology::Topology;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub mod rs_status;
pub mod tree;
pub mod vs_http;
pub mod vs_status;

pub use rs_status::collect_rs_status;
pub use tree::collect_topology;
pub use vs_http::collect_vs_http_stats;
pub use vs_status::collect_vs_status;

/// One enriched record, complete before it is handed to a sink
pub type Record = serde_json::Map<String, serde_json::Value>;

pub const TAGS_FIELD: &str = "tags";
pub const TIMESTAMP_FIELD: &str = "@timestamp";
pub const HEALTH_FIELD: &str = "health";

/// Statistics families that can be requested per target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    VsStatus,
    VsHttpStats,
    RsStatus,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::VsStatus => "vs_status",
            Topic::VsHttpStats => "vs_http_stats",
            Topic::RsStatus => "rs_status",
        }
    }

    /// Measurement label the batch is written under
    pub fn measurement(&self) -> &'static str {
        match self {
            Topic::VsStatus => "virtualServerStatus",
            Topic::VsHttpStats => "virtualServerHttpStats",
            Topic::RsStatus => "realServerStatus",
        }
    }
}

/// Shared context passed to all collectors for one scrape cycle
#[derive(Clone, Copy)]
pub struct CollectionContext<'a> {
    pub client: &'a FadcClient,
    pub topology: &'a Topology,
    pub vdom: &'a str,
}

/// Run the collector for `topic`
pub async fn collect_topic(ctx: &CollectionContext<'_>, topic: Topic) -> Result<Vec<Record>> {
    match topic {
        Topic::VsStatus => collect_vs_status(ctx).await,
        Topic::VsHttpStats => collect_vs_http_stats(ctx).await,
        Topic::RsStatus => collect_rs_status(ctx).await,
    }
}

pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Require a JSON object payload
pub fn into_record(what: &str, value: serde_json::Value) -> Result<Record> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ExporterError::MalformedResponse(format!(
            "expected an object for {}, got {}",
            what, other
        ))),
    }
}

/// Attach the tag set and batch timestamp
pub fn stamp(mut record: Record, tags: BTreeMap<String, String>, timestamp: i64) -> Record {
    record.insert(TAGS_FIELD.to_string(), tags_value(tags));
    record.insert(TIMESTAMP_FIELD.to_string(), timestamp.into());
    record
}

fn tags_value(tags: BTreeMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        tags.into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect(),
    )
}

/// Merge `tags` into every record's tag set; existing keys are overwritten
pub fn enrich(records: &mut [Record], tags: &BTreeMap<String, String>) {
    if tags.is_empty() {
        return;
    }
    for record in records.iter_mut() {
        let entry = record
            .entry(TAGS_FIELD.to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        if !entry.is_object() {
            *entry = serde_json::Value::Object(Default::default());
        }
        if let serde_json::Value::Object(map) = entry {
            for (k, v) in tags {
                map.insert(k.clone(), serde_json::Value::String(v.clone()));
            }
        }
    }
}

/// Keep successful records, log and drop failed ones.
///
/// Each outcome is labelled with the object it belongs to, for logging.
pub fn finish_batch<I>(topic: Topic, outcomes: I) -> Result<Vec<Record>>
where
    I: IntoIterator<Item = (String, Result<Record>)>,
{
    let mut records = Vec::new();
    let mut connection_error = None;
    let mut failed = 0usize;

    for (label, outcome) in outcomes {
        match outcome {
            Ok(record) => records.push(record),
            Err(e) => {
                failed += 1;
                warn!("Failed to get {} for {}: {}", topic.as_str(), label, e);
                if e.is_connection_level() && connection_error.is_none() {
                    connection_error = Some(e);
                }
            }
        }
    }

    if records.is_empty() {
        if let Some(e) = connection_error {
            return Err(e);
        }
    }

    debug!(
        "Collected {} {} records ({} dropped)",
        records.len(),
        topic.as_str(),
        failed
    );
    Ok(records)
}
