use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use profithive_backend::services::ledger::{LedgerPolicy, LedgerService};
use profithive_backend::services::memory_store::InMemoryTokenStore;
use profithive_backend::services::postgres_store::PostgresTokenStore;
use profithive_backend::{AppState, build_router};
use serde_json::Value;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Router over a fresh in-memory ledger
#[allow(dead_code)]
pub fn memory_app() -> Router {
    let ledger = LedgerService::new(Arc::new(InMemoryTokenStore::new()), LedgerPolicy::default());
    build_router(AppState {
        ledger: Arc::new(ledger),
    })
}

/// Connect to the Postgres test database, if one is configured.
/// Tests that need it return early when `TEST_DATABASE_URL` is unset.
#[allow(dead_code)]
pub async fn setup_test_store() -> Option<PostgresTokenStore> {
    let database_url = env::var("TEST_DATABASE_URL").ok()?;
    let store = PostgresTokenStore::connect(&database_url, Duration::from_secs(5))
        .await
        .expect("Failed to connect to test DB");
    store
        .run_migrations()
        .await
        .expect("Failed to run migrations on test DB");
    Some(store)
}

#[allow(dead_code)]
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).to_string())
        })
    };
    (status, json)
}
