//! In-memory token store
//!
//! Used when no `DATABASE_URL` is configured and as the fake behind the
//! ledger and HTTP tests. A single mutex makes each method one atomic step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::models::token::{PurchaseRecord, TokenRecord};
use crate::services::token_store::{PurchaseOutcome, RestockOutcome, StoreError, TokenStore};

#[derive(Default)]
struct MemoryState {
    counters: HashMap<String, i64>,
    tokens: BTreeMap<i64, TokenRecord>,
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    state: Mutex<MemoryState>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records regardless of their active flag
    pub fn len(&self) -> usize {
        self.state.lock().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn next_sequence(&self, counter: &str) -> Result<i64, StoreError> {
        let mut state = self.state.lock();
        let seq = state.counters.entry(counter.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn insert_token(&self, record: TokenRecord) -> Result<TokenRecord, StoreError> {
        let mut state = self.state.lock();
        if state.tokens.contains_key(&record.id) {
            return Err(StoreError::DatabaseError(format!(
                "duplicate token id {}",
                record.id
            )));
        }
        state.tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_active(&self, id: i64) -> Result<Option<TokenRecord>, StoreError> {
        let state = self.state.lock();
        Ok(state.tokens.get(&id).filter(|t| t.is_active).cloned())
    }

    async fn list_active(&self) -> Result<Vec<TokenRecord>, StoreError> {
        let state = self.state.lock();
        let mut tokens: Vec<TokenRecord> = state
            .tokens
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tokens)
    }

    async fn purchase_if_available(
        &self,
        id: i64,
        purchase: PurchaseRecord,
    ) -> Result<PurchaseOutcome, StoreError> {
        let mut state = self.state.lock();
        let Some(token) = state.tokens.get_mut(&id).filter(|t| t.is_active) else {
            return Ok(PurchaseOutcome::NotFound);
        };

        if token.available_tokens < purchase.amount {
            return Ok(PurchaseOutcome::Insufficient {
                available: token.available_tokens,
            });
        }

        token.available_tokens -= purchase.amount;
        token.buyers.push(purchase);
        Ok(PurchaseOutcome::Purchased {
            remaining: token.available_tokens,
        })
    }

    async fn restock_if_owner(
        &self,
        id: i64,
        additional: i64,
        owner: &str,
        restocked_at: DateTime<Utc>,
    ) -> Result<RestockOutcome, StoreError> {
        let mut state = self.state.lock();
        let Some(token) = state.tokens.get_mut(&id).filter(|t| t.is_active) else {
            return Ok(RestockOutcome::NotFound);
        };

        if token.owner_address != owner {
            return Ok(RestockOutcome::NotOwner);
        }

        let (Some(total), Some(available)) = (
            token.total_tokens.checked_add(additional),
            token.available_tokens.checked_add(additional),
        ) else {
            return Err(StoreError::DatabaseError(format!(
                "supply overflow restocking token {}",
                id
            )));
        };
        let Some(total_value) = Decimal::from(total).checked_mul(token.price_per_token) else {
            return Err(StoreError::DatabaseError(format!(
                "total value overflow restocking token {}",
                id
            )));
        };

        token.total_tokens = total;
        token.available_tokens = available;
        token.total_value = total_value;
        token.last_restocked_at = Some(restocked_at);
        Ok(RestockOutcome::Restocked(token.clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(id: i64, total: i64) -> TokenRecord {
        TokenRecord {
            id,
            business_name: format!("Business {}", id),
            description: String::new(),
            revenue_estimate: dec!(100000),
            tokenize_percentage: dec!(20),
            price_per_token: dec!(50),
            total_tokens: total,
            available_tokens: total,
            total_value: Decimal::from(total) * dec!(50),
            owner_address: "0xowner".to_string(),
            is_active: true,
            buyers: vec![],
            created_at: Utc::now(),
            last_restocked_at: None,
        }
    }

    fn purchase(amount: i64) -> PurchaseRecord {
        PurchaseRecord {
            buyer: "0xbuyer".to_string(),
            amount,
            total_cost: Decimal::from(amount) * dec!(50),
            eth_amount_paid: None,
            payment_tx_hash: None,
            is_paid_on_chain: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_sequence_is_per_counter() {
        let store = InMemoryTokenStore::new();
        assert_eq!(store.next_sequence("tokenId").await.unwrap(), 1);
        assert_eq!(store.next_sequence("tokenId").await.unwrap(), 2);
        assert_eq!(store.next_sequence("other").await.unwrap(), 1);
        assert_eq!(store.next_sequence("tokenId").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = InMemoryTokenStore::new();
        store.insert_token(record(1, 10)).await.unwrap();
        assert!(store.insert_token(record(1, 10)).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_purchase_guard_checked_at_write() {
        let store = InMemoryTokenStore::new();
        store.insert_token(record(1, 10)).await.unwrap();

        let outcome = store.purchase_if_available(1, purchase(7)).await.unwrap();
        assert_eq!(outcome, PurchaseOutcome::Purchased { remaining: 3 });

        let outcome = store.purchase_if_available(1, purchase(4)).await.unwrap();
        assert_eq!(outcome, PurchaseOutcome::Insufficient { available: 3 });

        let token = store.find_active(1).await.unwrap().unwrap();
        assert_eq!(token.available_tokens, 3);
        assert_eq!(token.buyers.len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_records_are_invisible() {
        let store = InMemoryTokenStore::new();
        let mut inactive = record(2, 10);
        inactive.is_active = false;
        store.insert_token(record(1, 10)).await.unwrap();
        store.insert_token(inactive).await.unwrap();

        assert!(store.find_active(2).await.unwrap().is_none());
        assert_eq!(store.list_active().await.unwrap().len(), 1);
        assert_eq!(
            store.purchase_if_available(2, purchase(1)).await.unwrap(),
            PurchaseOutcome::NotFound
        );
        assert_eq!(
            store.restock_if_owner(2, 5, "0xowner", Utc::now()).await.unwrap(),
            RestockOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_restock_requires_owner() {
        let store = InMemoryTokenStore::new();
        store.insert_token(record(1, 10)).await.unwrap();

        let outcome = store.restock_if_owner(1, 5, "0xother", Utc::now()).await.unwrap();
        assert_eq!(outcome, RestockOutcome::NotOwner);

        match store.restock_if_owner(1, 5, "0xowner", Utc::now()).await.unwrap() {
            RestockOutcome::Restocked(token) => {
                assert_eq!(token.total_tokens, 15);
                assert_eq!(token.available_tokens, 15);
                assert_eq!(token.total_value, dec!(750));
                assert!(token.last_restocked_at.is_some());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_restock_value_overflow_leaves_record_untouched() {
        let store = InMemoryTokenStore::new();
        let mut token = record(1, 10);
        token.price_per_token = dec!(100000000000);
        token.total_value = dec!(1000000000000);
        store.insert_token(token.clone()).await.unwrap();

        let result = store
            .restock_if_owner(1, i64::MAX - 10, "0xowner", Utc::now())
            .await;
        assert!(matches!(result, Err(StoreError::DatabaseError(_))));

        let stored = store.find_active(1).await.unwrap().unwrap();
        assert_eq!(stored, token);
    }
}
