use ad_renderer::{
    backends::BackendRegistry,
    config::Config,
    jobs::JobStore,
    server::{router, AppState},
};
use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::load().context("loading configuration")?);
    info!(?config, "loaded configuration");

    let registry = BackendRegistry::new(config.clone());
    for backend in registry.available_backends() {
        match backend.reason {
            None => info!(backend = %backend.id, "backend available"),
            Some(reason) => warn!(backend = %backend.id, %reason, "backend unavailable"),
        }
    }

    let app = router(AppState { registry, store: JobStore::default() });
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    info!(?addr, "Renderer listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
