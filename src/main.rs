use profithive_backend::config::AppConfig;
use profithive_backend::services::ledger::LedgerService;
use profithive_backend::services::memory_store::InMemoryTokenStore;
use profithive_backend::services::postgres_store::PostgresTokenStore;
use profithive_backend::services::token_store::TokenStore;
use profithive_backend::{AppState, build_router};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,profithive_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let store: Arc<dyn TokenStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresTokenStore::connect(url, config.storage_timeout).await?;
            store.run_migrations().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory token store (data is not persisted)");
            Arc::new(InMemoryTokenStore::new())
        }
    };

    let ledger = Arc::new(LedgerService::new(store, config.ledger_policy()));
    let state = AppState {
        ledger: ledger.clone(),
    };

    let app = build_router(state).layer(config.cors_layer()?);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        price_per_token = %config.price_per_token,
        "Server listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ledger.shutdown().await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
