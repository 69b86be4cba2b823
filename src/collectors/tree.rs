//! Topology Collector
//!
//! Fetches the nested virtual server tree and rebuilds the [`Topology`] for the
//! current scrape cycle.

use crate::error::Result;
use crate::fortiadc::types::{parse_tree, TREES_PATH};
use crate::fortiadc::FadcClient;
use crate::topology::{NameFilter, Topology};
use tracing::{debug, info};

/// Query `get_trees` and build the topology, keeping virtual servers accepted by
/// `filter`.
///
/// # Errors
///
/// Propagates client errors; a payload that is not a list is a
/// [`MalformedResponse`](crate::error::ExporterError::MalformedResponse).
/// Individual records of the wrong shape are skipped.
pub async fn collect_topology(
    client: &FadcClient,
    vdom: &str,
    filter: &NameFilter,
) -> Result<Topology> {
    info!(host = %client.hostname(), "Fetching tree...");
    let data = client.get(TREES_PATH, &[("vdom", vdom.to_string())]).await?;

    let payload = parse_tree(data)?;

    let topology = Topology::build_filtered(&payload, filter);
    if !filter.is_empty() {
        debug!(
            host = %client.hostname(),
            "{} of {} virtual servers matched the name filter",
            topology.virtual_servers().count(),
            payload.len()
        );
    }
    info!(
        host = %client.hostname(),
        "Discovered {} Virtual Servers",
        topology.virtual_servers().count()
    );
    Ok(topology)
}
