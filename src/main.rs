use anyhow::Result;
use clap::Parser;
use fadc_exporter::{config::Config, metrics::MetricsCollector, scraper, server};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/Default.toml")]
    config: String,

    /// Port for the self-metrics endpoint (overrides config)
    #[arg(short, long, env = "EXPORTER_PORT")]
    port: Option<u16>,

    /// Address to bind the self-metrics endpoint to (overrides config)
    #[arg(short, long, env = "EXPORTER_ADDR")]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting FortiADC Exporter v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let mut config = Config::load(&args.config)?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    info!(
        "Configuration loaded successfully: {} targets, {} writers",
        config.targets.len(),
        config.writers.len()
    );

    let metrics = MetricsCollector::new()?;
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        shutdown.cancel();
    });

    let server_handle = if config.server.enabled {
        let server_config = config.server.clone();
        let metrics = metrics.clone();
        let cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server::start(&server_config, metrics, cancel).await {
                error!("Server error: {}", e);
            }
        }))
    } else {
        None
    };

    let summary = scraper::run(&config, metrics, cancel.clone()).await?;

    // every target loop has exited; stop the metrics server too
    cancel.cancel();
    if let Some(handle) = server_handle {
        if let Err(e) = handle.await {
            warn!("Metrics server task failed: {}", e);
        }
    }

    if !summary.is_success() {
        error!(
            "Scrape loops ended with errors for: {}",
            summary.failed_targets.join(", ")
        );
        std::process::exit(1);
    }

    info!("Exporter stopped");
    Ok(())
}
