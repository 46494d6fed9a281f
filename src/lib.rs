// src/lib.rs

use axum::{
    Router,
    routing::{get, post},
};
use services::ledger::LedgerService;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerService>,
}

pub mod entities {
    pub mod prelude;
    pub mod business_tokens;
    pub mod token_purchases;
}

pub mod services {
    pub mod ledger;
    pub mod memory_store;
    pub mod postgres_store;
    pub mod token_store;
}

pub mod handlers {
    pub mod health;
    pub mod token;
}

pub mod models {
    pub mod token;
}

pub mod config;

/// All routes, without CORS (origin policy comes from config in `main`)
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/tokens", get(handlers::token::get_all_tokens))
        .route("/api/tokens/create", post(handlers::token::create_token))
        .route("/api/tokens/buy", post(handlers::token::buy_tokens))
        .route("/api/tokens/{id}", get(handlers::token::get_token))
        .route(
            "/api/tokens/{id}/restock",
            post(handlers::token::restock_tokens),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
