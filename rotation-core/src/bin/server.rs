//! Rotation engine server binary

use rotation_core::{Config, RotationEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting SusuRail Rotation Server");

    // Load configuration
    let config = Config::from_env()?;

    // Open engine
    let engine = RotationEngine::open(config)?;
    tracing::info!("Rotation engine opened successfully");

    // Keep the process alive; the engine is driven in-process by the
    // presentation layer, so the binary only hosts it.
    let _feed = engine.distribution_feed();
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down rotation server");
    Ok(())
}
