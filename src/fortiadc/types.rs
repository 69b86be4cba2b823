//! FortiADC REST API Type Definitions
//!
//! Wire-level types for the FortiADC management API. Every read goes through a
//! JSON envelope of the form `{"payload": <data | error code>}`; a negative integer
//! payload is an application-level error rather than data.
//!
//! # API Endpoints Covered
//!
//! - `/api/user/login` → [`LoginRequest`], [`LoginResponse`]
//! - `/api/load_balance_virtual_server/get_trees` → [`RawTreeNode`]
//! - `/api/status_history/vs_status` → free-form JSON object
//! - `/api/status_history/rs_status` → free-form JSON object
//! - `/api/fortiview/get_vs_http` → object with `category_0..3` buckets
//!
//! Status and statistics payloads are forwarded to sinks as-is, so they stay
//! `serde_json::Value` instead of being modelled field by field.

use crate::error::{ExporterError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

pub const LOGIN_PATH: &str = "/api/user/login";
pub const TREES_PATH: &str = "/api/load_balance_virtual_server/get_trees";
pub const VS_STATUS_PATH: &str = "/api/status_history/vs_status";
pub const RS_STATUS_PATH: &str = "/api/status_history/rs_status";
pub const VS_HTTP_PATH: &str = "/api/fortiview/get_vs_http";

/// Number of category buckets returned by the HTTP statistics endpoint.
pub const HTTP_STAT_CATEGORIES: usize = 4;

/// Body posted to the login endpoint
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Login response; only the bearer token is used
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// Unwrap the standard `{"payload": ...}` envelope.
///
/// - missing or `null` payload → [`ExporterError::MalformedResponse`]
/// - negative integer payload → [`ExporterError::Api`] carrying the code
/// - anything else → the payload itself
pub fn unwrap_payload(path: &str, mut body: serde_json::Value) -> Result<serde_json::Value> {
    let payload = body
        .get_mut("payload")
        .map(serde_json::Value::take)
        .unwrap_or(serde_json::Value::Null);

    match payload {
        serde_json::Value::Null => Err(ExporterError::MalformedResponse(format!(
            "response from {} has no payload",
            path
        ))),
        serde_json::Value::Number(ref n) if n.as_i64().is_some_and(|code| code < 0) => {
            Err(ExporterError::Api {
                code: n.as_i64().unwrap_or_default(),
                path: path.to_string(),
            })
        }
        data => Ok(data),
    }
}

/// One record of the nested virtual server tree.
///
/// The same shape is used at every level (virtual server, content routing rule,
/// pool, real server); which fields are meaningful depends on the depth.
///
/// Every field is lenient: a value of the wrong type reads as absent, and a
/// child that is not an object is skipped, so one odd record never rejects
/// the rest of the tree.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawTreeNode {
    #[serde(default, deserialize_with = "lenient_string")]
    pub mkey: Option<String>,
    #[serde(default, rename = "content-routing", deserialize_with = "lenient_string")]
    pub content_routing: Option<String>,
    #[serde(default, rename = "current-status", deserialize_with = "lenient_string")]
    pub current_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub real_server_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: Option<u16>,
    #[serde(default, deserialize_with = "lenient_children")]
    pub children: Vec<RawTreeNode>,
}

impl RawTreeNode {
    pub fn content_routing_enabled(&self) -> bool {
        self.content_routing.as_deref() == Some("enable")
    }
}

/// Accept identifiers sent either as strings or as bare numbers
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Parse the `get_trees` payload, dropping records that are not objects.
///
/// # Errors
///
/// [`ExporterError::MalformedResponse`] if the payload itself is not a list.
pub fn parse_tree(data: serde_json::Value) -> Result<Vec<RawTreeNode>> {
    match data {
        serde_json::Value::Array(items) => Ok(parse_nodes(items)),
        other => Err(ExporterError::MalformedResponse(format!(
            "unexpected tree payload: expected a list, got {}",
            other
        ))),
    }
}

fn parse_nodes(items: Vec<serde_json::Value>) -> Vec<RawTreeNode> {
    items
        .into_iter()
        .filter_map(|item| match RawTreeNode::deserialize(item) {
            Ok(node) => Some(node),
            Err(e) => {
                warn!("Skipping unreadable tree record: {}", e);
                None
            }
        })
        .collect()
}

/// `null` or a non-list reads as no children
fn lenient_children<'de, D>(deserializer: D) -> std::result::Result<Vec<RawTreeNode>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(items) => parse_nodes(items),
        _ => Vec::new(),
    })
}

fn lenient_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.and_then(|s| s.trim().parse().ok()))
}
