//! FortiADC Load Balancer Exporter
//!
//! Periodically scrapes one or more FortiADC appliances and writes virtual
//! server and real server statistics to pluggable sinks (stdout, HTTP).
//!
//! # Overview
//!
//! Each scrape cycle rebuilds the load-balancing topology of a target
//! (virtual server → content routing → pool → real server) from the appliance's
//! tree endpoint, then issues one follow-up query per topology object and
//! correlates every answer with the object it was asked for.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   REST + bearer    ┌──────────────────────┐
//! │  FortiADC   │ ◄────────────────► │       Exporter       │
//! │ appliance   │   {"payload": …}   │                      │      ┌──────────┐
//! └─────────────┘                    │  ┌────────┐          │ ───► │  stdout  │
//!                                    │  │ Client │ topology │      └──────────┘
//!                                    │  └────────┘ collect  │      ┌──────────┐
//!                                    │  ┌────────┐          │ ───► │ HTTP POST│
//!                                    │  │Scraper │  sinks   │      └──────────┘
//!                                    │  └────────┘          │
//!                                    └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`fortiadc`] - session client and wire types
//! - [`topology`] - arena tree with flat and nested views
//! - [`collectors`] - per-topic correlation
//! - [`scraper`] - per-target loop with backoff and cancellation
//! - [`sinks`] - output sinks
//! - [`server`] - self-metrics HTTP endpoint
//! - [`config`] - configuration management
//! - [`error`] - error types
//!
//! # Quick Start
//!
//! ```no_run
//! use fadc_exporter::{config::Config, metrics::MetricsCollector, scraper};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     let summary = scraper::run(&config, MetricsCollector::new()?, CancellationToken::new()).await?;
//!     assert!(summary.is_success());
//!     Ok(())
//! }
//! ```

pub mod collectors;
pub mod config;
pub mod error;
pub mod fortiadc;
pub mod health;
pub mod metrics;
pub mod scraper;
pub mod server;
pub mod sinks;
pub mod topology;
