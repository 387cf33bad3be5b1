//! Offersync server - binary entry point

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use offersync::auth::{BearerResolver, ResolverChain, SessionCookieResolver, SessionTable};
use offersync::config::ServerConfig;
use offersync::error::SyncResult;
use offersync::server::{create_router, AppState};
use offersync::store::MemoryStore;

#[tokio::main]
async fn main() -> SyncResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let store = Arc::new(MemoryStore::new());
    let sessions = Arc::new(SessionTable::new());
    let resolvers = ResolverChain::new()
        .with(Arc::new(BearerResolver::new(&config.jwt_secret)?))
        .with(Arc::new(SessionCookieResolver::new(sessions)));

    let state = AppState::build(store, resolvers, &config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        target: "offersync::server",
        addr = %config.bind_addr,
        version = offersync::VERSION,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!(target: "offersync::server", "shutdown signal received");
    }
}
