//! HTTP sink: POSTs each batch envelope to a collector URL

use super::{envelope, Sink};
use crate::collectors::Record;
use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

pub struct HttpSink {
    url: String,
    http: reqwest::Client,
    // one POST in flight per sink
    write_lock: Mutex<()>,
}

impl HttpSink {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ExporterError::Config(format!("Failed to build HTTP sink: {}", e)))?;

        Ok(Self {
            url,
            http,
            write_lock: Mutex::new(()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn initialize(&self) -> Result<()> {
        info!("HTTP sink posting to {}", self.url);
        Ok(())
    }

    async fn write(&self, records: &[Record], measurement: &str) -> Result<()> {
        let body = envelope(records, measurement);

        let _guard = self.write_lock.lock().await;
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Could not establish connection to {}: {}", self.url, e);
                ExporterError::SinkWriteFailed(format!("{}: {}", self.url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExporterError::SinkWriteFailed(format!(
                "{} answered HTTP {}",
                self.url, status
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // wait for an in-flight POST to finish
        let _guard = self.write_lock.lock().await;
        Ok(())
    }
}
