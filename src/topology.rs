//! Virtual Server Topology
//!
//! Rebuilds the appliance's load-balancing hierarchy from the nested tree payload:
//!
//! ```text
//! VirtualServer → ContentRouting → RealServerPool → RealServer
//! ```
//!
//! Nodes live in a flat arena addressed by [`NodeId`]. The two lookup structures
//! used by the collectors are read-only views derived from that arena:
//!
//! - [`FlatIndex`]: one [`FlatRow`] per real server, carrying every ancestor name
//! - [`NestedIndex`]: name-keyed tree for status lookup by (vs, cr, pool, rs) path
//!
//! A virtual server with content routing disabled gets a synthetic content routing
//! node named [`NO_CONTENT_ROUTING`], so pools always sit at the same depth.
//!
//! A topology is built from scratch every scrape cycle and never updated in place.

use crate::fortiadc::types::RawTreeNode;
use crate::health::HealthStatus;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Name of the placeholder content routing node
pub const NO_CONTENT_ROUTING: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    VirtualServer,
    ContentRouting,
    RealServerPool,
    RealServer,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::VirtualServer => "virtualServer",
            ObjectType::ContentRouting => "contentRouting",
            ObjectType::RealServerPool => "realServerPool",
            ObjectType::RealServer => "realServer",
        }
    }

    /// Tag key under which a node of this type records its name in a [`FlatRow`]
    pub fn name_key(&self) -> &'static str {
        match self {
            ObjectType::VirtualServer => "virtualServerName",
            ObjectType::ContentRouting => "contentRoutingName",
            ObjectType::RealServerPool => "realServerPoolName",
            ObjectType::RealServer => "realServerName",
        }
    }
}

/// Member details only present on real servers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealServerMember {
    pub member_id: String,
    pub address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct TopologyNode {
    pub name: String,
    pub object_type: ObjectType,
    pub current_status: Option<String>,
    pub member: Option<RealServerMember>,
    children: Vec<NodeId>,
}

impl TopologyNode {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus::from_status(self.current_status.as_deref())
    }
}

/// Shell-style allow-list for virtual server names (`*` and `?` wildcards)
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    patterns: Vec<String>,
}

impl NameFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// An empty filter keeps every name
    pub fn matches(&self, name: &str) -> bool {
        self.is_empty() || self.patterns.iter().any(|p| wildcard_match(p, name))
    }
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some(&'*') => {
                star = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match star {
                // backtrack: let the last star swallow one more char
                Some((sp, sn)) => {
                    p = sp + 1;
                    n = sn + 1;
                    star = Some((sp, sn + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// One root-to-leaf path, materialised as the tag set of a real server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRow {
    pub virtual_server_name: String,
    pub content_routing_name: String,
    pub real_server_pool_name: String,
    pub real_server_name: String,
    pub pool_member_id: String,
}

impl FlatRow {
    /// (vs, cr, pool, rs) path used for nested index lookup
    pub fn path(&self) -> [&str; 4] {
        [
            &self.virtual_server_name,
            &self.content_routing_name,
            &self.real_server_pool_name,
            &self.real_server_name,
        ]
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                ObjectType::VirtualServer.name_key().to_string(),
                self.virtual_server_name.clone(),
            ),
            (
                ObjectType::ContentRouting.name_key().to_string(),
                self.content_routing_name.clone(),
            ),
            (
                ObjectType::RealServerPool.name_key().to_string(),
                self.real_server_pool_name.clone(),
            ),
            (
                ObjectType::RealServer.name_key().to_string(),
                self.real_server_name.clone(),
            ),
            ("poolMemberId".to_string(), self.pool_member_id.clone()),
        ])
    }
}

/// Ancestor names accumulated on the way down; each branch owns its copy
#[derive(Debug, Clone, Default)]
struct Ancestry {
    virtual_server: Option<String>,
    content_routing: Option<String>,
    pool: Option<String>,
}

/// Flat rows grouped by virtual server, in topology order
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    entries: Vec<(String, Vec<FlatRow>)>,
}

impl FlatIndex {
    pub fn get(&self, vs_name: &str) -> Option<&[FlatRow]> {
        self.entries
            .iter()
            .find(|(name, _)| name == vs_name)
            .map(|(_, rows)| rows.as_slice())
    }

    pub fn virtual_servers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Every row across all virtual servers
    pub fn rows(&self) -> impl Iterator<Item = &FlatRow> {
        self.entries.iter().flat_map(|(_, rows)| rows.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, rows)| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct NestedEntry {
    pub node: NodeId,
    pub object_type: ObjectType,
    pub current_status: Option<String>,
    pub children: HashMap<String, NestedEntry>,
}

/// Name-keyed view of the topology
#[derive(Debug, Clone, Default)]
pub struct NestedIndex {
    roots: HashMap<String, NestedEntry>,
}

impl NestedIndex {
    pub fn get(&self, vs_name: &str) -> Option<&NestedEntry> {
        self.roots.get(vs_name)
    }

    /// Walk a name path from a virtual server downwards
    pub fn lookup(&self, path: &[&str]) -> Option<&NestedEntry> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.roots.get(*first)?, |entry, name| entry.children.get(*name))
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: Vec<TopologyNode>,
    roots: Vec<NodeId>,
}

impl Topology {
    /// Build the full topology from the `get_trees` payload
    pub fn build(payload: &[RawTreeNode]) -> Self {
        Self::build_filtered(payload, &NameFilter::default())
    }

    /// Build the topology, keeping only virtual servers accepted by `filter`
    pub fn build_filtered(payload: &[RawTreeNode], filter: &NameFilter) -> Self {
        let mut topology = Topology::default();

        for vs_data in payload {
            let Some(name) = vs_data.mkey.clone() else {
                warn!("Skipping virtual server record without a name");
                continue;
            };
            if !filter.matches(&name) {
                continue;
            }

            let vs = topology.push(TopologyNode {
                name,
                object_type: ObjectType::VirtualServer,
                current_status: vs_data.current_status.clone(),
                member: None,
                children: Vec::new(),
            });

            if vs_data.content_routing_enabled() {
                for cr_data in &vs_data.children {
                    let Some(cr_name) = cr_data.mkey.clone() else {
                        warn!("Skipping content routing record without a name");
                        continue;
                    };
                    let cr = topology.push_child(vs, content_routing(cr_name));
                    for pool_data in &cr_data.children {
                        topology.push_pool(cr, pool_data);
                    }
                }
            } else {
                let cr = topology.push_child(vs, content_routing(NO_CONTENT_ROUTING.to_string()));
                for pool_data in &vs_data.children {
                    topology.push_pool(cr, pool_data);
                }
            }

            topology.roots.push(vs);
        }

        topology
    }

    fn push(&mut self, node: TopologyNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn push_child(&mut self, parent: NodeId, node: TopologyNode) -> NodeId {
        let id = self.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_pool(&mut self, parent: NodeId, pool_data: &RawTreeNode) {
        let Some(pool_name) = pool_data.mkey.clone() else {
            warn!("Skipping real server pool record without a name");
            return;
        };
        let pool = self.push_child(
            parent,
            TopologyNode {
                name: pool_name,
                object_type: ObjectType::RealServerPool,
                current_status: pool_data.current_status.clone(),
                member: None,
                children: Vec::new(),
            },
        );

        for rs_data in &pool_data.children {
            let (Some(rs_name), Some(member_id)) =
                (rs_data.real_server_id.clone(), rs_data.mkey.clone())
            else {
                warn!("Skipping real server record without an id");
                continue;
            };
            self.push_child(
                pool,
                TopologyNode {
                    name: rs_name,
                    object_type: ObjectType::RealServer,
                    current_status: rs_data.current_status.clone(),
                    member: Some(RealServerMember {
                        member_id,
                        address: rs_data.address.clone(),
                        port: rs_data.port,
                    }),
                    children: Vec::new(),
                },
            );
        }
    }

    pub fn node(&self, id: NodeId) -> &TopologyNode {
        &self.nodes[id.0]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn virtual_servers(&self) -> impl Iterator<Item = &TopologyNode> {
        self.roots.iter().map(|id| self.node(*id))
    }

    pub fn virtual_server_names(&self) -> Vec<&str> {
        self.virtual_servers().map(|vs| vs.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of real server leaves reachable from the roots
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.object_type == ObjectType::RealServer)
            .count()
    }

    /// Depth-first rows for the subtree rooted at `id`
    pub fn flatten(&self, id: NodeId) -> Vec<FlatRow> {
        let mut rows = Vec::new();
        self.flatten_into(id, Ancestry::default(), &mut rows);
        rows
    }

    fn flatten_into(&self, id: NodeId, mut ancestry: Ancestry, rows: &mut Vec<FlatRow>) {
        let node = self.node(id);
        match node.object_type {
            ObjectType::VirtualServer => ancestry.virtual_server = Some(node.name.clone()),
            ObjectType::ContentRouting => ancestry.content_routing = Some(node.name.clone()),
            ObjectType::RealServerPool => ancestry.pool = Some(node.name.clone()),
            ObjectType::RealServer => {
                rows.push(FlatRow {
                    virtual_server_name: ancestry.virtual_server.unwrap_or_default(),
                    content_routing_name: ancestry.content_routing.unwrap_or_default(),
                    real_server_pool_name: ancestry.pool.unwrap_or_default(),
                    real_server_name: node.name.clone(),
                    pool_member_id: node
                        .member
                        .as_ref()
                        .map(|m| m.member_id.clone())
                        .unwrap_or_default(),
                });
                return;
            }
        }

        // siblings get their own copy; the last child inherits ours
        if let Some((last, rest)) = node.children.split_last() {
            for child in rest {
                self.flatten_into(*child, ancestry.clone(), rows);
            }
            self.flatten_into(*last, ancestry, rows);
        }
    }

    pub fn flat_index(&self) -> FlatIndex {
        FlatIndex {
            entries: self
                .roots
                .iter()
                .map(|id| (self.node(*id).name.clone(), self.flatten(*id)))
                .collect(),
        }
    }

    pub fn nested_index(&self) -> NestedIndex {
        NestedIndex {
            roots: self.nested_level(&self.roots),
        }
    }

    fn nested_level(&self, ids: &[NodeId]) -> HashMap<String, NestedEntry> {
        ids.iter()
            .map(|id| {
                let node = self.node(*id);
                let entry = NestedEntry {
                    node: *id,
                    object_type: node.object_type,
                    current_status: node.current_status.clone(),
                    children: self.nested_level(&node.children),
                };
                (node.name.clone(), entry)
            })
            .collect()
    }
}

fn content_routing(name: String) -> TopologyNode {
    TopologyNode {
        name,
        object_type: ObjectType::ContentRouting,
        current_status: None,
        member: None,
        children: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_patterns() {
        assert!(wildcard_match("web-*", "web-frontend"));
        assert!(wildcard_match("*-api", "billing-api"));
        assert!(wildcard_match("vs?", "vs1"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("a*b*c", "axxbyyc"));
        assert!(!wildcard_match("web-*", "api-web"));
        assert!(!wildcard_match("vs?", "vs10"));
        assert!(!wildcard_match("exact", "exact2"));
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filter = NameFilter::default();
        assert!(filter.matches("anything"));
    }

    #[test]
    fn test_filter_matches_any_pattern() {
        let filter = NameFilter::new(["web-*", "mail"]);
        assert!(filter.matches("web-1"));
        assert!(filter.matches("mail"));
        assert!(!filter.matches("mail-2"));
    }
}
