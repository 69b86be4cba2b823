use crate::collectors::Topic;
use crate::topology::NameFilter;
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default = "default_writers")]
    pub writers: Vec<WriterConfig>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Self-metrics endpoint of the exporter itself
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial")]
    pub initial_seconds: u64,
    #[serde(default = "default_backoff_max")]
    pub max_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WriterConfig {
    Stdout,
    Http {
        url: String,
        #[serde(default = "default_writer_timeout")]
        timeout_seconds: u64,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub hostname: String,
    pub base_url: String,
    pub username: String,
    pub password: SecretString,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_vdom")]
    pub vdom: String,
    #[serde(default)]
    pub vs_filter: Vec<String>,
    #[serde(default)]
    pub fail_on_empty_topology: bool,
    #[serde(default)]
    pub scrape_configs: Vec<ScrapeConfig>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ScrapeConfig {
    pub topic: Topic,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9105
}

fn default_true() -> bool {
    true
}

fn default_verify_ssl() -> bool {
    true
}

fn default_scrape_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_vdom() -> String {
    "root".to_string()
}

fn default_backoff_initial() -> u64 {
    5
}

fn default_backoff_max() -> u64 {
    300
}

fn default_writer_timeout() -> u64 {
    10
}

fn default_writers() -> Vec<WriterConfig> {
    vec![WriterConfig::Stdout]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            addr: default_addr(),
            port: default_port(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_seconds: default_backoff_initial(),
            max_seconds: default_backoff_max(),
        }
    }
}

impl BackoffConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_secs(self.initial_seconds)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_seconds.max(self.initial_seconds))
    }
}

impl TargetConfig {
    /// Static tags attached to every record, with `hostname` filled in if absent
    pub fn static_tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.tags.clone();
        tags.entry("hostname".to_string())
            .or_insert_with(|| self.hostname.clone());
        tags
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.scrape_configs.iter().map(|s| s.topic).collect()
    }

    pub fn name_filter(&self) -> NameFilter {
        NameFilter::new(self.vs_filter.iter().cloned())
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Base URL without trailing slashes
    pub fn api_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("FADC_EXPORTER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    /// Parse configuration from an in-memory document (TOML, YAML, ...)
    pub fn from_document(contents: &str, format: config::FileFormat) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(contents, format))
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    fn finish(config: config::Config) -> Result<Self> {
        let config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            bail!("Configuration must define at least one target");
        }
        for target in &self.targets {
            if target.hostname.trim().is_empty() {
                bail!("Target hostname must not be empty");
            }
            if target.base_url.trim().is_empty() {
                bail!("Target {} has an empty base_url", target.hostname);
            }
            if target.scrape_interval == 0 {
                bail!(
                    "Target {} has scrape_interval 0; it must be greater than zero",
                    target.hostname
                );
            }
        }
        for writer in &self.writers {
            if let WriterConfig::Http { url, .. } = writer {
                if url.trim().is_empty() {
                    bail!("HTTP writer requires a url");
                }
            }
        }
        Ok(())
    }
}
