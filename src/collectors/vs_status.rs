//! Virtual Server Status Collector
//!
//! One `vs_status` query per virtual server.
//!
//! # Record Shape
//! - status fields as returned by the appliance
//! - `health` - code derived from the virtual server's tree status
//! - `tags` - `virtualServerName`
//! - `@timestamp` - shared by the whole batch

use super::{
    finish_batch, into_record, stamp, unix_timestamp, CollectionContext, Record, Topic,
    HEALTH_FIELD,
};
use crate::error::Result;
use crate::fortiadc::types::VS_STATUS_PATH;
use crate::fortiadc::ApiQuery;
use crate::topology::ObjectType;
use std::collections::BTreeMap;

pub async fn collect_vs_status(ctx: &CollectionContext<'_>) -> Result<Vec<Record>> {
    let queries: Vec<_> = ctx
        .topology
        .virtual_servers()
        .map(|vs| {
            ApiQuery::new(vs, VS_STATUS_PATH)
                .param("vdom", ctx.vdom)
                .param("vsname", vs.name.as_str())
        })
        .collect();

    let responses = ctx.client.bulk_get(queries).await;
    let timestamp = unix_timestamp();

    finish_batch(
        Topic::VsStatus,
        responses.into_iter().map(|slot| {
            let vs = slot.key;
            let outcome = slot.result.and_then(|data| {
                let mut record = into_record(&vs.name, data)?;
                record.insert(HEALTH_FIELD.to_string(), vs.health().code().into());
                let tags = BTreeMap::from([(
                    ObjectType::VirtualServer.name_key().to_string(),
                    vs.name.clone(),
                )]);
                Ok(stamp(record, tags, timestamp))
            });
            (vs.name.clone(), outcome)
        }),
    )
}
