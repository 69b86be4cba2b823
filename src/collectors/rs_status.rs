//! Real Server Status Collector
//!
//! One `rs_status` query per real server leaf, parameterised by the leaf's full
//! ancestry from the flat index. Health comes from the tree status of the leaf,
//! looked up through the nested index; the `rs_status` response is a different
//! endpoint and is never used to derive it.

use super::{
    finish_batch, into_record, stamp, unix_timestamp, CollectionContext, Record, Topic,
    HEALTH_FIELD,
};
use crate::error::Result;
use crate::fortiadc::types::RS_STATUS_PATH;
use crate::fortiadc::ApiQuery;
use crate::health::HealthStatus;
use crate::topology::{FlatRow, NestedIndex, NO_CONTENT_ROUTING};

/// Content routing name as the API expects it: the placeholder becomes `""`
pub fn content_routing_param(name: &str) -> &str {
    if name == NO_CONTENT_ROUTING {
        ""
    } else {
        name
    }
}

/// Tree health of the leaf addressed by `row`
pub fn leaf_health(index: &NestedIndex, row: &FlatRow) -> HealthStatus {
    index
        .lookup(&row.path())
        .map(|entry| HealthStatus::from_status(entry.current_status.as_deref()))
        .unwrap_or(HealthStatus::Unknown)
}

pub async fn collect_rs_status(ctx: &CollectionContext<'_>) -> Result<Vec<Record>> {
    let flat_index = ctx.topology.flat_index();
    let nested_index = ctx.topology.nested_index();

    let queries: Vec<_> = flat_index
        .rows()
        .map(|row| {
            let health = leaf_health(&nested_index, row);
            ApiQuery::new((row, health), RS_STATUS_PATH)
                .param("vdom", ctx.vdom)
                .param("vsname", row.virtual_server_name.as_str())
                .param("crname", content_routing_param(&row.content_routing_name))
                .param("poolname", row.real_server_pool_name.as_str())
                .param("member", row.pool_member_id.as_str())
        })
        .collect();

    let responses = ctx.client.bulk_get(queries).await;
    let timestamp = unix_timestamp();

    finish_batch(
        Topic::RsStatus,
        responses.into_iter().map(|slot| {
            let (row, health) = slot.key;
            let label = row.path().join("/");
            let outcome = slot.result.and_then(|data| {
                let mut record = into_record(&label, data)?;
                record.insert(HEALTH_FIELD.to_string(), health.code().into());
                Ok(stamp(record, row.tags(), timestamp))
            });
            (label, outcome)
        }),
    )
}
