//! Storage seam for the token ledger
//!
//! Every mutating method is a single atomic step on the backing store.
//! Callers never read a counter and write it back; the store checks the
//! guard (supply, ownership, active flag) at write time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;

use crate::models::token::{PurchaseRecord, TokenRecord};

/// Counter used to allocate token ids
pub const TOKEN_ID_COUNTER: &str = "tokenId";

/// Error types for token stores
#[derive(Debug)]
pub enum StoreError {
    DatabaseError(String),
    Timeout(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            StoreError::Timeout(msg) => write!(f, "Timeout: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// Result of a conditional purchase write
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    /// Supply was decremented and the purchase appended
    Purchased { remaining: i64 },
    /// Supply at write time was below the requested amount; nothing changed
    Insufficient { available: i64 },
    /// No active record with that id
    NotFound,
}

/// Result of a conditional restock write
#[derive(Debug, Clone, PartialEq)]
pub enum RestockOutcome {
    Restocked(TokenRecord),
    /// Record exists but the caller is not its owner; nothing changed
    NotOwner,
    NotFound,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Atomically increment the named counter and return the new value.
    /// The first call for a name returns 1.
    async fn next_sequence(&self, counter: &str) -> Result<i64, StoreError>;

    /// Persist a new record. `record.buyers` is expected to be empty.
    async fn insert_token(&self, record: TokenRecord) -> Result<TokenRecord, StoreError>;

    async fn find_active(&self, id: i64) -> Result<Option<TokenRecord>, StoreError>;

    /// Active records, newest first
    async fn list_active(&self) -> Result<Vec<TokenRecord>, StoreError>;

    /// Decrement `available_tokens` by `purchase.amount` and append the
    /// purchase, only if enough supply remains at write time.
    async fn purchase_if_available(
        &self,
        id: i64,
        purchase: PurchaseRecord,
    ) -> Result<PurchaseOutcome, StoreError>;

    /// Add `additional` to both supply counters and recompute the total value,
    /// only if `owner` matches the record's owner at write time.
    async fn restock_if_owner(
        &self,
        id: i64,
        additional: i64,
        owner: &str,
        restocked_at: DateTime<Utc>,
    ) -> Result<RestockOutcome, StoreError>;

    /// Liveness check against the backing store
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release connections. The store must not be used afterwards.
    async fn close(&self) -> Result<(), StoreError>;
}
