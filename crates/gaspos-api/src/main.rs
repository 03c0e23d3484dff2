mod auth;
mod config;
mod error;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use gaspos_core::sync::{NodeStatusStore, TableRegistry};
use gaspos_core::DatabaseService;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gaspos_api=info".parse().expect("valid directive"))
                .add_directive("gaspos_core=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting gaspos-api with config: {:?}", config);

    let db = DatabaseService::open_path(&config.db_path, TableRegistry::standard()).await?;
    let status = NodeStatusStore::new(config.status_path.clone());
    let node = status.read()?;
    tracing::info!(phase = node.phase.as_str(), "Loaded node status");

    let bind_addr = config.bind_addr.clone();
    let router = app_router(AppState::new(config, db, status));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("gaspos-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
