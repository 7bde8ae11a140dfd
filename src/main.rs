use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use agri_market::api;
use agri_market::config::MarketConfig;
use agri_market::service::MarketService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agri_market=debug,tower_http=info".into()),
        )
        .init();

    let config = MarketConfig::from_env()?;
    info!(db_path = %config.db_path.display(), "opening database");

    let db = sled::open(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    let service = MarketService::new(Arc::new(db));

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "marketplace listening");

    axum::serve(listener, api::router(service)).await?;

    Ok(())
}
