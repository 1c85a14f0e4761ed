use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tenancy_api::app::{router, AppState, Backends};
use tenancy_api::auth::JwtVerifier;
use tenancy_api::database::{ConnectionPoolManager, PgPoolFactory};
use tenancy_api::store::spawn_purger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tenancy_api=info,tower_http=info")),
        )
        .init();

    let config = tenancy_api::config::config();
    tracing::info!("Starting Tenancy API in {:?} mode", config.environment);

    let backends = Backends::open(config).await.context("failed to open backends")?;
    let factory = PgPoolFactory::new(&config.database.url, config.dedicated_pool.clone())
        .context("invalid DATABASE_URL")?;
    let pools = ConnectionPoolManager::new(backends.pool.clone(), factory);
    let verifier = Arc::new(JwtVerifier::new(config.security.jwt_secret.clone()).context("JWT_SECRET is required")?);

    let purger = spawn_purger(backends.counters.clone(), config.tenancy.purge_interval());

    let state = AppState::new(config, backends.tenants.clone(), backends.counters.clone(), pools, verifier);
    let pools = state.pools.clone();
    let app = router(state, config);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Tenancy API listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    purger.abort();
    pools.close_all().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
