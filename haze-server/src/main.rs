use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use haze_server::{router, AppState, ServiceConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::parse();
    info!(model = %config.model_id, "starting haze server");

    let state = Arc::new(AppState::new(config));

    // Warm up the pipeline so steady-state requests never pay load latency.
    state.pipeline().await.context("failed to load pipeline")?;
    info!("pipeline ready");

    let app = router(state.clone());

    let bind_address = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
