//! Session client tests
//!
//! Tests for login, payload unwrapping, 401 recovery and bulk fetches against a
//! mocked appliance.

mod common;

use fadc_exporter::error::ExporterError;
use fadc_exporter::fortiadc::{ApiQuery, FadcClient};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn authenticated_client(server: &MockServer) -> FadcClient {
    common::mount_login(server, "token-1").await;
    let client = FadcClient::new(&common::target(&server.uri())).unwrap();
    client.authenticate().await.unwrap();
    client
}

#[tokio::test]
async fn test_authenticate_posts_credentials_and_uses_bearer_token() {
    // Given: An appliance accepting admin/secret
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .and(body_json(json!({"username": "admin", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/status_history/vs_status"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(common::payload(json!({"status": "up"})))
        .mount(&server)
        .await;

    // When: Authenticating and issuing a GET
    let client = FadcClient::new(&common::target(&server.uri())).unwrap();
    client.authenticate().await.unwrap();
    let data = client
        .get("/api/status_history/vs_status", &[("vdom", "root".to_string())])
        .await
        .unwrap();

    // Then: The token is installed and the payload unwrapped
    assert!(client.is_authenticated().await);
    assert_eq!(data, json!({"status": "up"}));
}

#[tokio::test]
async fn test_rejected_credentials_are_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = FadcClient::new(&common::target(&server.uri())).unwrap();
    let result = client.authenticate().await;

    assert!(matches!(result, Err(ExporterError::AuthenticationFailed(_))));
    assert!(!client.is_authenticated().await);
}

#[tokio::test]
async fn test_login_server_error_is_connection_failure() {
    // Given: An appliance whose login endpoint is unavailable
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    // When: Authenticating
    let client = FadcClient::new(&common::target(&server.uri())).unwrap();
    let error = client.authenticate().await.unwrap_err();

    // Then: The credentials are not blamed
    assert!(matches!(error, ExporterError::ConnectionFailed(_)));
    assert_eq!(error.kind(), "connection");
}

#[tokio::test]
async fn test_login_without_token_is_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .mount(&server)
        .await;

    let client = FadcClient::new(&common::target(&server.uri())).unwrap();
    let result = client.authenticate().await;

    assert!(matches!(result, Err(ExporterError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn test_unreachable_appliance_is_connection_failure() {
    // Given: A port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    // When: Authenticating
    let client = FadcClient::new(&common::target(&uri)).unwrap();
    let result = client.authenticate().await;

    // Then: The fault is connection-level
    let error = result.unwrap_err();
    assert!(matches!(error, ExporterError::ConnectionFailed(_)));
    assert!(error.is_connection_level());
}

#[tokio::test]
async fn test_negative_payload_is_api_error() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/status_history/vs_status"))
        .respond_with(common::payload(json!(-15)))
        .mount(&server)
        .await;

    let result = client.get("/api/status_history/vs_status", &[]).await;

    match result {
        Err(ExporterError::Api { code, path }) => {
            assert_eq!(code, -15);
            assert_eq!(path, "/api/status_history/vs_status");
        }
        other => panic!("expected an API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_payload_is_malformed() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/status_history/vs_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": 1})))
        .mount(&server)
        .await;

    let result = client.get("/api/status_history/vs_status", &[]).await;

    assert!(matches!(result, Err(ExporterError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/status_history/vs_status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = client.get("/api/status_history/vs_status", &[]).await;

    assert!(matches!(result, Err(ExporterError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_positive_and_zero_payloads_are_data() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/status_history/vs_status"))
        .respond_with(common::payload(json!(0)))
        .mount(&server)
        .await;

    let result = client.get("/api/status_history/vs_status", &[]).await;

    assert_eq!(result.unwrap(), json!(0));
}

#[tokio::test]
async fn test_unauthorized_request_reauthenticates_and_retries_once() {
    // Given: The first token expires; a second login hands out a new one
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "old"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "new"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer new"))
        .respond_with(common::payload(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = FadcClient::new(&common::target(&server.uri())).unwrap();
    client.authenticate().await.unwrap();

    // When: Issuing a GET with the expired token
    let data = client.get("/api/status_history/vs_status", &[]).await;

    // Then: The request succeeds after one re-login
    assert_eq!(data.unwrap(), json!({"ok": true}));
    let logins = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/user/login")
        .count();
    assert_eq!(logins, 2);
}

#[tokio::test]
async fn test_repeated_unauthorized_is_authentication_failure() {
    // Given: Every GET is rejected, whatever the token
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    // When: Issuing a GET
    let result = client.get("/api/status_history/vs_status", &[]).await;

    // Then: Exactly one retry, then an authentication failure
    assert!(matches!(result, Err(ExporterError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn test_bulk_get_preserves_query_order() {
    // Given: Responses arriving in reverse order, with one failing query
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    for (name, delay_ms) in [("vs-0", 150u64), ("vs-1", 100), ("vs-3", 0)] {
        Mock::given(method("GET"))
            .and(path("/api/status_history/vs_status"))
            .and(query_param("vsname", name))
            .respond_with(
                common::payload(json!({"name": name}))
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/status_history/vs_status"))
        .and(query_param("vsname", "vs-2"))
        .respond_with(common::payload(json!(-1)))
        .mount(&server)
        .await;

    let queries: Vec<_> = (0..4)
        .map(|i| {
            ApiQuery::new(i, "/api/status_history/vs_status")
                .param("vdom", "root")
                .param("vsname", format!("vs-{}", i))
        })
        .collect();

    // When: Running them as one bulk fetch
    let results = client.bulk_get(queries).await;

    // Then: One slot per query, in query order, the failure isolated to its slot
    assert_eq!(results.len(), 4);
    let keys: Vec<_> = results.iter().map(|r| r.key).collect();
    assert_eq!(keys, vec![0, 1, 2, 3]);
    assert_eq!(results[0].result.as_ref().unwrap()["name"], "vs-0");
    assert_eq!(results[1].result.as_ref().unwrap()["name"], "vs-1");
    assert!(matches!(
        results[2].result,
        Err(ExporterError::Api { code: -1, .. })
    ));
    assert_eq!(results[3].result.as_ref().unwrap()["name"], "vs-3");
}

#[tokio::test]
async fn test_concurrent_unauthorized_responses_trigger_one_login() {
    // Given: A stale token that every query will be rejected with
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "stale"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "fresh"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(common::payload(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = FadcClient::new(&common::target(&server.uri())).unwrap();
    client.authenticate().await.unwrap();

    // When: Eight queries hit 401 concurrently
    let queries: Vec<_> = (0..8)
        .map(|i| ApiQuery::new(i, "/api/status_history/vs_status").param("vsname", i.to_string()))
        .collect();
    let results = client.bulk_get(queries).await;

    // Then: All succeed after a single re-login (plus the initial one)
    assert!(results.iter().all(|r| r.result.is_ok()));
    let logins = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/user/login")
        .count();
    assert_eq!(logins, 2);
}

#[tokio::test]
async fn test_close_drops_the_token() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    client.close().await;

    assert!(!client.is_authenticated().await);
}
