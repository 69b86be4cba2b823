//! Shared fixtures for integration tests

#![allow(dead_code)]

use fadc_exporter::collectors::Topic;
use fadc_exporter::config::{ScrapeConfig, TargetConfig};
use fadc_exporter::fortiadc::types::RawTreeNode;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Two virtual servers:
///
/// - `web-vs` (content routing disabled) → `N/A` → `web-pool` → `rs-a` (HEALTHY), `rs-b` (DOWN)
/// - `api-vs` (content routing enabled) → `cr-v1` → `api-pool` → `rs-c` (DISABLED)
///   and `cr-v2` → `api-pool-2` → `rs-d` (UNHEALTHY)
pub fn tree_payload() -> Value {
    json!([
        {
            "mkey": "web-vs",
            "content-routing": "disable",
            "current-status": "HEALTHY",
            "children": [
                {
                    "mkey": "web-pool",
                    "current-status": "HEALTHY",
                    "children": [
                        {
                            "mkey": "1",
                            "real_server_id": "rs-a",
                            "current-status": "HEALTHY",
                            "address": "10.0.0.11",
                            "port": 80
                        },
                        {
                            "mkey": 2,
                            "real_server_id": "rs-b",
                            "current-status": "DOWN",
                            "address": "10.0.0.12",
                            "port": "8080"
                        }
                    ]
                }
            ]
        },
        {
            "mkey": "api-vs",
            "content-routing": "enable",
            "current-status": "UNHEALTHY",
            "children": [
                {
                    "mkey": "cr-v1",
                    "children": [
                        {
                            "mkey": "api-pool",
                            "current-status": "HEALTHY",
                            "children": [
                                {
                                    "mkey": "1",
                                    "real_server_id": "rs-c",
                                    "current-status": "DISABLED"
                                }
                            ]
                        }
                    ]
                },
                {
                    "mkey": "cr-v2",
                    "children": [
                        {
                            "mkey": "api-pool-2",
                            "current-status": "DOWN",
                            "children": [
                                {
                                    "mkey": "3",
                                    "real_server_id": "rs-d",
                                    "current-status": "UNHEALTHY"
                                }
                            ]
                        }
                    ]
                }
            ]
        }
    ])
}

pub fn raw_tree() -> Vec<RawTreeNode> {
    serde_json::from_value(tree_payload()).expect("fixture tree should parse")
}

pub fn target(base_url: &str) -> TargetConfig {
    TargetConfig {
        hostname: "adc01".to_string(),
        base_url: base_url.to_string(),
        username: "admin".to_string(),
        password: SecretString::from("secret"),
        verify_ssl: true,
        scrape_interval: 60,
        request_timeout_seconds: 5,
        vdom: "root".to_string(),
        vs_filter: Vec::new(),
        fail_on_empty_topology: false,
        scrape_configs: Vec::new(),
        tags: BTreeMap::new(),
    }
}

pub fn scrape_config(topic: Topic) -> ScrapeConfig {
    ScrapeConfig {
        topic,
        tags: BTreeMap::new(),
    }
}

/// Login endpoint handing out `token`
pub async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
        .mount(server)
        .await;
}

pub async fn mount_tree(server: &MockServer, tree: Value) {
    Mock::given(method("GET"))
        .and(path("/api/load_balance_virtual_server/get_trees"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "payload": tree })))
        .mount(server)
        .await;
}

pub fn payload(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "payload": data }))
}
