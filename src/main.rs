use std::net::SocketAddr;

use tienda_crm_api::{config, database::manager::DatabaseManager, routes};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::config();
    tracing::info!("Starting Tienda CRM API in {:?} mode", config.environment);

    if config.database.run_migrations {
        DatabaseManager::run_migrations().await?;
    }

    // Allow tests or deployments to override port via env
    let port = std::env::var("TIENDA_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;

    tracing::info!("Tienda CRM API listening on http://{}", bind_addr);

    axum::serve(
        listener,
        routes::app().into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    DatabaseManager::close_all().await;
    Ok(())
}
