//! wirestat - reference host for the metrics facade.
//!
//! Loads a TOML config, builds a facade, serves `/metrics` and optionally
//! runs an instrumented TCP echo listener until Ctrl-C.

mod echo;

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wirestat::{Config, MetricsFacade, RegistryDirectory};

use crate::echo::EchoServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("WIRESTAT_LOG_JSON").is_ok() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wirestat.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if !config.metrics.enabled {
        info!("Metrics disabled");
        return Ok(());
    }

    let directory = Arc::new(RegistryDirectory::new());
    let facade = Arc::new(MetricsFacade::with_directory(config.metrics.clone(), directory)?);

    if let Some(exporter) = &config.exporter {
        let registry = Arc::clone(facade.registry());
        let addr = exporter.listen;
        tokio::spawn(async move {
            wirestat::http::serve(registry, addr).await;
        });
        info!(%addr, "Prometheus HTTP server started");
    }

    if let Some(echo) = &config.echo {
        let server = EchoServer::bind(echo, &facade).await?;
        tokio::spawn(server.run());
        info!(address = %echo.listen, "Echo listener started");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    facade.close();

    Ok(())
}
