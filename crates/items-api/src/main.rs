mod config;
mod errors;
mod routes;
mod state;
mod timeout;

use std::sync::Arc;

use items_core::db::load_client;
use items_core::{DynamoProvider, MemoryBackend, Provisioner, ResourceProvider};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Backend, GatewayConfig};
use crate::errors::GatewayError;
use crate::state::Gateway;

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;
    let topology = state::load_topology(config.topology_path.as_deref()).await?;
    let previous = state::read_deployment(config.state_file.as_deref()).await?;

    let provider: Arc<dyn ResourceProvider> = match config.backend {
        Backend::Memory => Arc::new(MemoryBackend::new()),
        Backend::DynamoDb => Arc::new(DynamoProvider::new(load_client().await)),
    };
    let provisioner = Provisioner::new(provider);

    let gateway = Gateway::provision(&provisioner, previous.as_ref(), &topology).await?;
    state::write_deployment(config.state_file.as_deref(), &gateway.deployment).await?;

    let app = routes::router(&gateway, config.request_timeout)?;
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %config.bind_addr,
        api = %gateway.deployment.api_name,
        backend = ?config.backend,
        routes = gateway.deployment.routes.len(),
        "items gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("items gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}
