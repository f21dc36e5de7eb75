use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sendgate::config::Config;
use sendgate::controller::SendMessageController;
use sendgate::instance::loopback::LoopbackInstance;
use sendgate::instance::InstanceMonitor;
use sendgate::routes;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sendgate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Bind: {}", config.server.bind);
    info!("  Instances: {}", config.instances.len());

    let monitor = InstanceMonitor::new();
    for instance in &config.instances {
        monitor.register(
            &instance.name,
            Arc::new(LoopbackInstance::new(&instance.name, instance.channel_media)),
        );
    }
    if monitor.is_empty() {
        warn!("No instances configured; every send will answer 404");
    }

    let controller = SendMessageController::new(Arc::new(monitor));
    let app = routes::router(controller, config.server.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    info!("Send-message API listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
