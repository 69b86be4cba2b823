//! Virtual Server HTTP Statistics Collector
//!
//! One `get_vs_http` query per virtual server. The appliance splits the counters
//! over four `category_N` buckets; they are merged into one flat record.

use super::{finish_batch, into_record, stamp, unix_timestamp, CollectionContext, Record, Topic};
use crate::error::{ExporterError, Result};
use crate::fortiadc::types::{HTTP_STAT_CATEGORIES, VS_HTTP_PATH};
use crate::fortiadc::ApiQuery;
use crate::topology::ObjectType;
use std::collections::BTreeMap;

/// Merge the `category_0..3` buckets of one response into a single record
pub fn merge_categories(vs_name: &str, data: serde_json::Value) -> Result<Record> {
    let mut buckets = into_record(vs_name, data)?;
    let mut merged = Record::new();

    for index in 0..HTTP_STAT_CATEGORIES {
        let key = format!("category_{}", index);
        match buckets.remove(&key) {
            Some(serde_json::Value::Object(bucket)) => merged.extend(bucket),
            _ => {
                return Err(ExporterError::MalformedResponse(format!(
                    "HTTP stats for {} lack {}",
                    vs_name, key
                )))
            }
        }
    }
    Ok(merged)
}

pub async fn collect_vs_http_stats(ctx: &CollectionContext<'_>) -> Result<Vec<Record>> {
    let queries: Vec<_> = ctx
        .topology
        .virtual_servers()
        .map(|vs| {
            ApiQuery::new(vs.name.as_str(), VS_HTTP_PATH)
                .param("vdom", ctx.vdom)
                .param("vs", vs.name.as_str())
        })
        .collect();

    let responses = ctx.client.bulk_get(queries).await;
    let timestamp = unix_timestamp();

    finish_batch(
        Topic::VsHttpStats,
        responses.into_iter().map(|slot| {
            let vs_name = slot.key;
            let outcome = slot.result.and_then(|data| {
                let record = merge_categories(vs_name, data)?;
                let tags = BTreeMap::from([(
                    ObjectType::VirtualServer.name_key().to_string(),
                    vs_name.to_string(),
                )]);
                Ok(stamp(record, tags, timestamp))
            });
            (vs_name.to_string(), outcome)
        }),
    )
}
