//! Message correlation node.
//!
//! Starts every partition with the configuration from `CORRELATION_*`
//! environment variables and runs until Ctrl-C.
//!
//! ```bash
//! CORRELATION_PARTITION_COUNT=3 CORRELATION_METRICS_ADDR=0.0.0.0:9090 \
//!     RUST_LOG=correlation_runtime=debug cargo run --bin correlation-node
//! ```

use correlation_runtime::metrics::MetricsServer;
use correlation_runtime::{Engine, EngineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "correlation_node=info,correlation_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = EngineConfig::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    let mut metrics = config.metrics_addr.map(MetricsServer::new);
    if let Some(server) = metrics.as_mut() {
        server.start()?;
    }

    let engine = Engine::start(config)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received");

    engine.shutdown().await?;
    Ok(())
}
