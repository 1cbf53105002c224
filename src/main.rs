//! fedpress server binary

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fedpress::config::FederationConfig;
use fedpress::{build_router, FederationRuntime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = FederationConfig::load().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(
        base_url = %config.base_url(),
        domain = %config.instance_domain(),
        "Starting fedpress"
    );

    let runtime = FederationRuntime::new(config).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let workers = runtime.start_workers();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "Listening");
    axum::serve(listener, build_router(runtime)).await?;

    for worker in workers {
        worker.abort();
    }
    Ok(())
}
