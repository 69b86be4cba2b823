//! FortiADC REST API Client
//!
//! One authenticated HTTP session per appliance.
//!
//! # Architecture
//!
//! - **Authentication**: `POST /api/user/login` with username/password; the token
//!   from the response body is sent as `Authorization: Bearer <token>`
//! - **Envelope**: every GET response is `{"payload": ...}`, unwrapped by
//!   [`unwrap_payload`]
//! - **Retry**: a 401 triggers one transparent re-login (shared with every other
//!   request that hit 401 on the same token) and one retry of the request
//! - **Bulk**: [`FadcClient::bulk_get`] fans out concurrently over the same session
//!   and returns results in query order, each paired with its query's key
//!
//! # Example
//!
//! ```no_run
//! # use fadc_exporter::config::Config;
//! # use fadc_exporter::fortiadc::{ApiQuery, FadcClient};
//! # async fn example(config: Config) -> anyhow::Result<()> {
//! let client = FadcClient::new(&config.targets[0])?;
//! client.authenticate().await?;
//!
//! let queries = vec![ApiQuery::new("web-vs", "/api/status_history/vs_status")
//!     .param("vdom", "root")
//!     .param("vsname", "web-vs")];
//! for slot in client.bulk_get(queries).await {
//!     println!("{}: {:?}", slot.key, slot.result.is_ok());
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::TargetConfig;
use crate::error::{ExporterError, Result};
use crate::fortiadc::session::SessionManager;
use crate::fortiadc::types::{unwrap_payload, LoginRequest, LoginResponse, LOGIN_PATH};
use futures_util::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// One outbound GET, tagged with the key of the object it was issued for
#[derive(Debug, Clone)]
pub struct ApiQuery<K> {
    pub key: K,
    pub path: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl<K> ApiQuery<K> {
    pub fn new(key: K, path: &'static str) -> Self {
        Self {
            key,
            path,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.params.push((name, value.into()));
        self
    }
}

/// Outcome of one [`ApiQuery`] in a bulk fetch
#[derive(Debug)]
pub struct QueryResult<K> {
    pub key: K,
    pub result: Result<serde_json::Value>,
}

/// Client for the FortiADC management API
///
/// `Send + Sync`: bulk requests borrow the client concurrently and share its
/// cookie store and token.
pub struct FadcClient {
    http: reqwest::Client,
    base_url: String,
    hostname: String,
    username: String,
    password: SecretString,
    session: SessionManager,
}

impl FadcClient {
    pub fn new(target: &TargetConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        if !target.verify_ssl {
            warn!(
                host = %target.hostname,
                "TLS certificate verification disabled"
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .danger_accept_invalid_certs(!target.verify_ssl)
            .timeout(target.request_timeout())
            .build()
            .map_err(|e| ExporterError::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!(host = %target.hostname, "Initializing FortiADC REST API client");

        Ok(Self {
            http,
            base_url: target.api_base().to_string(),
            hostname: target.hostname.clone(),
            username: target.username.clone(),
            password: target.password.clone(),
            session: SessionManager::new(),
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.is_authenticated().await
    }

    /// Log in and install the bearer token for subsequent requests
    pub async fn authenticate(&self) -> Result<()> {
        self.session.login(|| self.login()).await?;
        info!(host = %self.hostname, "Authentication successful");
        Ok(())
    }

    async fn login(&self) -> Result<SecretString> {
        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        debug!(host = %self.hostname, "POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(&LoginRequest {
                username: &self.username,
                password: self.password.expose_secret(),
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            error!(
                host = %self.hostname,
                "Authentication error. Check username and password"
            );
            return Err(ExporterError::AuthenticationFailed(format!(
                "{} rejected the credentials for {}",
                self.base_url, self.username
            )));
        }
        if !status.is_success() {
            return Err(ExporterError::ConnectionFailed(format!(
                "login to {} returned HTTP {}",
                self.base_url, status
            )));
        }

        let body: LoginResponse = response.json().await.map_err(|e| {
            ExporterError::AuthenticationFailed(format!("unreadable login response: {}", e))
        })?;

        body.token.map(SecretString::from).ok_or_else(|| {
            ExporterError::AuthenticationFailed("login response did not include a token".into())
        })
    }

    async fn send_get(
        &self,
        path: &str,
        params: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(host = %self.hostname, "GET {} {:?}", url, params);

        let mut request = self.http.get(&url).query(params);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// Issue one authenticated GET and unwrap its payload.
    ///
    /// # Errors
    ///
    /// - [`ExporterError::AuthenticationFailed`] if the request is still rejected
    ///   after one re-login
    /// - [`ExporterError::ConnectionFailed`] on transport faults
    /// - [`ExporterError::Api`] when the payload is a negative error code
    /// - [`ExporterError::MalformedResponse`] when the payload is missing or the
    ///   body is not JSON
    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        let (token, generation) = self.session.snapshot().await;
        let mut response = self.send_get(path, params, token.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            info!(host = %self.hostname, "Unauthorized on {}, re-authenticating", path);
            self.session.refresh(generation, || self.login()).await?;

            let (token, _) = self.session.snapshot().await;
            response = self.send_get(path, params, token.as_deref()).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(ExporterError::AuthenticationFailed(format!(
                    "{} still unauthorized after re-authentication",
                    path
                )));
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ExporterError::MalformedResponse(format!(
                "{} returned HTTP {}",
                path, status
            )));
        }

        let body: serde_json::Value = response.json().await?;
        unwrap_payload(path, body).inspect_err(|e| {
            if let ExporterError::Api { code, .. } = e {
                error!(host = %self.hostname, "Error response from {}: code {}", path, code);
            }
        })
    }

    /// Run every query concurrently on this session.
    ///
    /// The output has exactly one slot per query, in query order. A failed query
    /// yields an `Err` in its own slot and never affects the others.
    pub async fn bulk_get<K>(&self, queries: Vec<ApiQuery<K>>) -> Vec<QueryResult<K>> {
        let started = Instant::now();
        let count = queries.len();

        let results = join_all(queries.into_iter().map(|query| async move {
            let result = self.get(query.path, &query.params).await;
            QueryResult {
                key: query.key,
                result,
            }
        }))
        .await;

        debug!(
            host = %self.hostname,
            "Bulk GET of {} queries took {:.3}s",
            count,
            started.elapsed().as_secs_f64()
        );
        results
    }

    /// Drop the session token
    pub async fn close(&self) {
        self.session.clear().await;
        info!(host = %self.hostname, "Closing client session for {}", self.base_url);
    }
}
