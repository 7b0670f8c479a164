use std::sync::Arc;

use anyhow::Context;
use roomchat::{AppState, Config, SqliteBackend, app};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("roomchat=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    let backend = SqliteBackend::connect(&config.database_url, config.storage_dir.clone()).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    let state = AppState {
        backend: Arc::new(backend),
        config: Arc::new(config),
    };
    axum::serve(listener, app(state)).await?;
    Ok(())
}
