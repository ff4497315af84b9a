mod app;
mod metrics;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mediamanager_core::config::{config_path_from_env, LogFormat, LoggingConfig};
use mediamanager_core::{load_config, validate_config, SanitizedConfig};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn run() -> Result<()> {
    let config_path = config_path_from_env();
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config.logging);
    info!("mediamanager {} starting", VERSION);
    info!("Configuration loaded from {:?}", config_path);

    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    let config_json = serde_json::to_string(&sanitized).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(config_hash = &config_hash[..16], "Effective configuration");
    debug!("{}", config_json);

    // touch the registry so core metrics are registered before any work runs
    once_cell::sync::Lazy::force(&metrics::REGISTRY);

    let app = app::build(&config).await?;
    app.lifecycle
        .start_all()
        .await
        .context("Failed to start components")?;
    info!("All components started");

    shutdown_signal().await;

    info!("Shutting down...");
    app.lifecycle.stop_all().await;
    debug!("Final metrics:\n{}", metrics::render());
    info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
