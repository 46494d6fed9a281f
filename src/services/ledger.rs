//! Business token ledger
//!
//! Issuance, owner restocks, purchases and reads. Validation happens here;
//! the guarded writes are delegated to a [`TokenStore`] so concurrent
//! purchases can never take supply below zero.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::models::token::{PurchaseRecord, TokenRecord};
use crate::services::token_store::{
    PurchaseOutcome, RestockOutcome, StoreError, TOKEN_ID_COUNTER, TokenStore,
};

/// Default price of one token in fiat units
pub const DEFAULT_PRICE_PER_TOKEN: Decimal = dec!(50);

/// Share of the revenue estimate tokenized when the issuer gives none
pub const DEFAULT_TOKENIZE_PERCENTAGE: Decimal = dec!(20);

/// Default bound on a single store call
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fractional digits kept by the `NUMERIC(_, 4)` money and percentage columns
pub const MONEY_SCALE: u32 = 4;

/// Exclusive bound of `NUMERIC(20,4)`: revenue estimate and price per token
pub const AMOUNT_LIMIT: Decimal = dec!(10000000000000000);

/// Exclusive bound of `NUMERIC(24,4)`: total value and purchase cost
pub const TOTAL_VALUE_LIMIT: Decimal = dec!(100000000000000000000);

/// Exclusive bound and scale of `NUMERIC(38,18)` for the ETH paid
const ETH_AMOUNT_LIMIT: Decimal = dec!(100000000000000000000);
const ETH_SCALE: u32 = 18;

/// Error types for ledger operations
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    Validation(String),
    NotFound(i64),
    Unauthorized,
    InsufficientSupply { requested: i64, available: i64 },
    Storage(String),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Validation(msg) => write!(f, "{}", msg),
            LedgerError::NotFound(id) => write!(f, "Token {} not found", id),
            LedgerError::Unauthorized => {
                write!(f, "Only the token owner can restock tokens")
            }
            LedgerError::InsufficientSupply {
                requested,
                available,
            } => write!(
                f,
                "Insufficient tokens: requested {}, only {} available",
                requested, available
            ),
            LedgerError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

/// Pricing and resource policy applied to new operations
#[derive(Debug, Clone)]
pub struct LedgerPolicy {
    pub price_per_token: Decimal,
    pub default_tokenize_percentage: Decimal,
    pub storage_timeout: Duration,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            price_per_token: DEFAULT_PRICE_PER_TOKEN,
            default_tokenize_percentage: DEFAULT_TOKENIZE_PERCENTAGE,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateTokenInput {
    pub business_name: String,
    pub description: String,
    pub revenue_estimate: Decimal,
    pub tokenize_percentage: Option<Decimal>,
    pub owner_address: String,
}

#[derive(Debug, Clone)]
pub struct BuyTokensInput {
    pub token_id: i64,
    pub amount: i64,
    pub buyer_address: String,
    pub payment_tx_hash: Option<String>,
    pub eth_amount_paid: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReceipt {
    pub remaining_tokens: i64,
    pub purchase: PurchaseRecord,
}

/// Wallet addresses are opaque, case-insensitive identity keys
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// `floor(revenue * percentage / 100 / price)`, `None` on overflow
pub fn compute_total_tokens(
    revenue_estimate: Decimal,
    tokenize_percentage: Decimal,
    price_per_token: Decimal,
) -> Option<i64> {
    revenue_estimate
        .checked_mul(tokenize_percentage)?
        .checked_div(Decimal::ONE_HUNDRED)?
        .checked_div(price_per_token)?
        .floor()
        .to_i64()
}

/// Whether `value` is stored exactly in a column bounded by `limit` and `scale`
pub fn fits_column(value: Decimal, limit: Decimal, scale: u32) -> bool {
    value.abs() < limit && value.normalize().scale() <= scale
}

pub struct LedgerService {
    store: Arc<dyn TokenStore>,
    policy: LedgerPolicy,
}

impl LedgerService {
    pub fn new(store: Arc<dyn TokenStore>, policy: LedgerPolicy) -> Self {
        Self { store, policy }
    }

    /// Run a store call under the policy timeout
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.policy.storage_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(operation = op, error = %e, "Store call failed");
                Err(e.into())
            }
            Err(_) => {
                error!(
                    operation = op,
                    timeout_ms = self.policy.storage_timeout.as_millis() as u64,
                    "Store call timed out"
                );
                Err(StoreError::Timeout(format!(
                    "{} exceeded {}ms",
                    op,
                    self.policy.storage_timeout.as_millis()
                ))
                .into())
            }
        }
    }

    pub async fn create_token(&self, input: CreateTokenInput) -> Result<TokenRecord, LedgerError> {
        let business_name = input.business_name.trim().to_string();
        if business_name.is_empty() {
            return Err(LedgerError::Validation(
                "businessName is required".to_string(),
            ));
        }

        let owner_address = normalize_address(&input.owner_address);
        if owner_address.is_empty() {
            return Err(LedgerError::Validation(
                "ownerAddress is required".to_string(),
            ));
        }

        if input.revenue_estimate.is_sign_negative() && !input.revenue_estimate.is_zero() {
            return Err(LedgerError::Validation(
                "revenueEstimate must not be negative".to_string(),
            ));
        }
        if !fits_column(input.revenue_estimate, AMOUNT_LIMIT, MONEY_SCALE) {
            return Err(LedgerError::Validation(
                "revenueEstimate must be below 10^16 with at most 4 decimal places".to_string(),
            ));
        }

        let percentage = input
            .tokenize_percentage
            .unwrap_or(self.policy.default_tokenize_percentage);
        if percentage <= Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
            return Err(LedgerError::Validation(
                "tokenizePercentage must be greater than 0 and at most 100".to_string(),
            ));
        }
        if percentage.normalize().scale() > MONEY_SCALE {
            return Err(LedgerError::Validation(
                "tokenizePercentage allows at most 4 decimal places".to_string(),
            ));
        }

        let price = self.policy.price_per_token;
        let total_tokens = compute_total_tokens(input.revenue_estimate, percentage, price)
            .ok_or_else(|| {
                LedgerError::Validation("revenueEstimate is too large".to_string())
            })?;
        let total_value = Decimal::from(total_tokens)
            .checked_mul(price)
            .filter(|v| *v < TOTAL_VALUE_LIMIT)
            .ok_or_else(|| {
                LedgerError::Validation("revenueEstimate is too large".to_string())
            })?;

        let id = self
            .bounded("next_sequence", self.store.next_sequence(TOKEN_ID_COUNTER))
            .await?;

        let record = TokenRecord {
            id,
            business_name,
            description: input.description.trim().to_string(),
            revenue_estimate: input.revenue_estimate,
            tokenize_percentage: percentage,
            price_per_token: price,
            total_tokens,
            available_tokens: total_tokens,
            total_value,
            owner_address,
            is_active: true,
            buyers: vec![],
            created_at: Utc::now(),
            last_restocked_at: None,
        };

        let created = self
            .bounded("insert_token", self.store.insert_token(record))
            .await?;

        info!(
            token_id = created.id,
            business = %created.business_name,
            owner = %created.owner_address,
            total_tokens = created.total_tokens,
            "Business token created"
        );

        Ok(created)
    }

    pub async fn buy_tokens(&self, input: BuyTokensInput) -> Result<PurchaseReceipt, LedgerError> {
        if input.amount <= 0 {
            return Err(LedgerError::Validation(
                "amount must be a positive integer".to_string(),
            ));
        }

        let buyer = normalize_address(&input.buyer_address);
        if buyer.is_empty() {
            return Err(LedgerError::Validation(
                "buyerAddress is required".to_string(),
            ));
        }

        if let Some(eth) = input.eth_amount_paid {
            if eth.is_sign_negative() && !eth.is_zero() {
                return Err(LedgerError::Validation(
                    "ethAmountPaid must not be negative".to_string(),
                ));
            }
            if !fits_column(eth, ETH_AMOUNT_LIMIT, ETH_SCALE) {
                return Err(LedgerError::Validation(
                    "ethAmountPaid must be below 10^20 with at most 18 decimal places"
                        .to_string(),
                ));
            }
        }

        let token = self
            .bounded("find_active", self.store.find_active(input.token_id))
            .await?
            .ok_or(LedgerError::NotFound(input.token_id))?;

        if input.amount > token.available_tokens {
            return Err(LedgerError::InsufficientSupply {
                requested: input.amount,
                available: token.available_tokens,
            });
        }

        let total_cost = Decimal::from(input.amount)
            .checked_mul(token.price_per_token)
            .ok_or_else(|| LedgerError::Validation("amount is too large".to_string()))?;

        let payment_tx_hash = input
            .payment_tx_hash
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());

        let purchase = PurchaseRecord {
            buyer,
            amount: input.amount,
            total_cost,
            eth_amount_paid: input.eth_amount_paid,
            is_paid_on_chain: payment_tx_hash.is_some(),
            payment_tx_hash,
            timestamp: Utc::now(),
        };

        let outcome = self
            .bounded(
                "purchase_if_available",
                self.store
                    .purchase_if_available(input.token_id, purchase.clone()),
            )
            .await?;

        match outcome {
            PurchaseOutcome::Purchased { remaining } => {
                info!(
                    token_id = input.token_id,
                    buyer = %purchase.buyer,
                    amount = purchase.amount,
                    remaining = remaining,
                    on_chain = purchase.is_paid_on_chain,
                    "Tokens purchased"
                );
                Ok(PurchaseReceipt {
                    remaining_tokens: remaining,
                    purchase,
                })
            }
            PurchaseOutcome::Insufficient { available } => {
                warn!(
                    token_id = input.token_id,
                    requested = input.amount,
                    available = available,
                    "Purchase lost race for remaining supply"
                );
                Err(LedgerError::InsufficientSupply {
                    requested: input.amount,
                    available,
                })
            }
            PurchaseOutcome::NotFound => Err(LedgerError::NotFound(input.token_id)),
        }
    }

    pub async fn restock_tokens(
        &self,
        token_id: i64,
        additional_tokens: i64,
        caller_address: &str,
    ) -> Result<TokenRecord, LedgerError> {
        let token = self
            .bounded("find_active", self.store.find_active(token_id))
            .await?
            .ok_or(LedgerError::NotFound(token_id))?;

        let caller = normalize_address(caller_address);
        if caller.is_empty() || caller != token.owner_address {
            warn!(
                token_id = token_id,
                caller = %caller,
                "Restock rejected for non-owner"
            );
            return Err(LedgerError::Unauthorized);
        }

        if additional_tokens <= 0 {
            return Err(LedgerError::Validation(
                "additionalTokens must be a positive integer".to_string(),
            ));
        }

        let restocked_value = token
            .total_tokens
            .checked_add(additional_tokens)
            .and_then(|total| Decimal::from(total).checked_mul(token.price_per_token));
        if !restocked_value.is_some_and(|v| v < TOTAL_VALUE_LIMIT) {
            return Err(LedgerError::Validation(
                "additionalTokens is too large".to_string(),
            ));
        }

        let outcome = self
            .bounded(
                "restock_if_owner",
                self.store
                    .restock_if_owner(token_id, additional_tokens, &caller, Utc::now()),
            )
            .await?;

        match outcome {
            RestockOutcome::Restocked(updated) => {
                info!(
                    token_id = token_id,
                    added = additional_tokens,
                    total_tokens = updated.total_tokens,
                    available_tokens = updated.available_tokens,
                    "Tokens restocked"
                );
                Ok(updated)
            }
            RestockOutcome::NotOwner => Err(LedgerError::Unauthorized),
            RestockOutcome::NotFound => Err(LedgerError::NotFound(token_id)),
        }
    }

    pub async fn get_token_by_id(&self, token_id: i64) -> Result<TokenRecord, LedgerError> {
        self.bounded("find_active", self.store.find_active(token_id))
            .await?
            .ok_or(LedgerError::NotFound(token_id))
    }

    pub async fn get_all_tokens(&self) -> Result<Vec<TokenRecord>, LedgerError> {
        let tokens = self
            .bounded("list_active", self.store.list_active())
            .await?;
        debug!(count = tokens.len(), "Listed active tokens");
        Ok(tokens)
    }

    pub async fn health(&self) -> Result<(), LedgerError> {
        self.bounded("ping", self.store.ping()).await
    }

    pub async fn shutdown(&self) -> Result<(), LedgerError> {
        self.bounded("close", self.store.close()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::InMemoryTokenStore;
    use async_trait::async_trait;
    use chrono::DateTime;

    fn ledger() -> LedgerService {
        LedgerService::new(Arc::new(InMemoryTokenStore::new()), LedgerPolicy::default())
    }

    fn cafe(owner: &str) -> CreateTokenInput {
        CreateTokenInput {
            business_name: "Cafe A".to_string(),
            description: "desc".to_string(),
            revenue_estimate: dec!(100000),
            tokenize_percentage: Some(dec!(20)),
            owner_address: owner.to_string(),
        }
    }

    fn buy(token_id: i64, amount: i64) -> BuyTokensInput {
        BuyTokensInput {
            token_id,
            amount,
            buyer_address: "0xBuyer".to_string(),
            payment_tx_hash: None,
            eth_amount_paid: None,
        }
    }

    #[test]
    fn test_compute_total_tokens() {
        assert_eq!(compute_total_tokens(dec!(100000), dec!(20), dec!(50)), Some(400));
        assert_eq!(compute_total_tokens(dec!(1249), dec!(20), dec!(50)), Some(4));
        assert_eq!(compute_total_tokens(dec!(0), dec!(20), dec!(50)), Some(0));
        assert_eq!(compute_total_tokens(Decimal::MAX, dec!(100), dec!(50)), None);
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("  0xAbC "), "0xabc");
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::InsufficientSupply {
            requested: 5,
            available: 2,
        };
        assert!(err.to_string().contains("only 2 available"));
        assert_eq!(LedgerError::NotFound(9).to_string(), "Token 9 not found");
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let ledger = ledger();
        let created = ledger.create_token(cafe("0xABC")).await.unwrap();

        assert_eq!(created.id, 1);
        assert_eq!(created.total_tokens, 400);
        assert_eq!(created.available_tokens, 400);
        assert_eq!(created.total_value, dec!(20000));
        assert_eq!(created.owner_address, "0xabc");
        assert!(created.is_active);
        assert!(created.buyers.is_empty());

        let fetched = ledger.get_token_by_id(created.id).await.unwrap();
        assert_eq!(fetched.available_tokens, fetched.total_tokens);
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_defaults_percentage() {
        let ledger = ledger();
        let mut input = cafe("0xabc");
        input.tokenize_percentage = None;
        let created = ledger.create_token(input).await.unwrap();
        assert_eq!(created.tokenize_percentage, dec!(20));
        assert_eq!(created.total_tokens, 400);
    }

    #[tokio::test]
    async fn test_create_ids_increase() {
        let ledger = ledger();
        let a = ledger.create_token(cafe("0xabc")).await.unwrap();
        let b = ledger.create_token(cafe("0xabc")).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let ledger = ledger();

        let mut input = cafe("0xabc");
        input.business_name = "   ".to_string();
        assert!(matches!(
            ledger.create_token(input).await,
            Err(LedgerError::Validation(_))
        ));

        let mut input = cafe("0xabc");
        input.tokenize_percentage = Some(dec!(0));
        assert!(matches!(
            ledger.create_token(input).await,
            Err(LedgerError::Validation(_))
        ));

        let mut input = cafe("0xabc");
        input.tokenize_percentage = Some(dec!(100.5));
        assert!(matches!(
            ledger.create_token(input).await,
            Err(LedgerError::Validation(_))
        ));

        let mut input = cafe("0xabc");
        input.revenue_estimate = dec!(-1);
        assert!(matches!(
            ledger.create_token(input).await,
            Err(LedgerError::Validation(_))
        ));

        assert!(ledger.get_all_tokens().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_values_the_columns_cannot_hold() {
        let ledger = ledger();

        let mut input = cafe("0xabc");
        input.revenue_estimate = dec!(10000000000000000);
        assert!(matches!(
            ledger.create_token(input).await,
            Err(LedgerError::Validation(_))
        ));

        let mut input = cafe("0xabc");
        input.revenue_estimate = dec!(100000.12345);
        assert!(matches!(
            ledger.create_token(input).await,
            Err(LedgerError::Validation(_))
        ));

        let mut input = cafe("0xabc");
        input.tokenize_percentage = Some(dec!(12.345678));
        assert!(matches!(
            ledger.create_token(input).await,
            Err(LedgerError::Validation(_))
        ));

        assert!(ledger.get_all_tokens().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_accepts_values_at_column_precision() {
        let ledger = ledger();

        let mut input = cafe("0xabc");
        input.revenue_estimate = dec!(9999999999999999.9999);
        input.tokenize_percentage = Some(dec!(12.34560));
        let created = ledger.create_token(input).await.unwrap();
        assert_eq!(created.tokenize_percentage, dec!(12.3456));
        assert_eq!(
            created.total_value,
            Decimal::from(created.total_tokens) * dec!(50)
        );
    }

    #[test]
    fn test_fits_column() {
        assert!(fits_column(dec!(12.3456), AMOUNT_LIMIT, MONEY_SCALE));
        assert!(fits_column(dec!(12.500000), AMOUNT_LIMIT, MONEY_SCALE));
        assert!(!fits_column(dec!(12.34567), AMOUNT_LIMIT, MONEY_SCALE));
        assert!(!fits_column(AMOUNT_LIMIT, AMOUNT_LIMIT, MONEY_SCALE));
    }

    #[tokio::test]
    async fn test_price_is_captured_per_record() {
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        let old = LedgerService::new(store.clone(), LedgerPolicy::default());
        let created = old.create_token(cafe("0xabc")).await.unwrap();

        let new = LedgerService::new(
            store,
            LedgerPolicy {
                price_per_token: dec!(100),
                ..LedgerPolicy::default()
            },
        );
        let receipt = new.buy_tokens(buy(created.id, 2)).await.unwrap();
        assert_eq!(receipt.purchase.total_cost, dec!(100));
    }

    #[tokio::test]
    async fn test_buy_records_purchase() {
        let ledger = ledger();
        let token = ledger.create_token(cafe("0xabc")).await.unwrap();

        let mut input = buy(token.id, 10);
        input.payment_tx_hash = Some("0xdeadbeef".to_string());
        input.eth_amount_paid = Some(dec!(0.25));
        let receipt = ledger.buy_tokens(input).await.unwrap();

        assert_eq!(receipt.remaining_tokens, 390);
        assert_eq!(receipt.purchase.buyer, "0xbuyer");
        assert_eq!(receipt.purchase.total_cost, dec!(500));
        assert!(receipt.purchase.is_paid_on_chain);

        let stored = ledger.get_token_by_id(token.id).await.unwrap();
        assert_eq!(stored.available_tokens, 390);
        assert_eq!(stored.total_tokens, 400);
        assert_eq!(stored.buyers, vec![receipt.purchase]);
    }

    #[tokio::test]
    async fn test_blank_tx_hash_is_not_on_chain() {
        let ledger = ledger();
        let token = ledger.create_token(cafe("0xabc")).await.unwrap();

        let mut input = buy(token.id, 1);
        input.payment_tx_hash = Some("  ".to_string());
        let receipt = ledger.buy_tokens(input).await.unwrap();
        assert!(!receipt.purchase.is_paid_on_chain);
        assert!(receipt.purchase.payment_tx_hash.is_none());
    }

    #[tokio::test]
    async fn test_buy_rejects_non_positive_amount() {
        let ledger = ledger();
        let token = ledger.create_token(cafe("0xabc")).await.unwrap();

        for amount in [0, -5] {
            assert!(matches!(
                ledger.buy_tokens(buy(token.id, amount)).await,
                Err(LedgerError::Validation(_))
            ));
        }

        let stored = ledger.get_token_by_id(token.id).await.unwrap();
        assert_eq!(stored.available_tokens, 400);
        assert!(stored.buyers.is_empty());
    }

    #[tokio::test]
    async fn test_buy_insufficient_reports_remaining() {
        let ledger = ledger();
        let token = ledger.create_token(cafe("0xabc")).await.unwrap();
        ledger.buy_tokens(buy(token.id, 300)).await.unwrap();

        let err = ledger.buy_tokens(buy(token.id, 200)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientSupply {
                requested: 200,
                available: 100
            }
        );
        assert_eq!(
            ledger.get_token_by_id(token.id).await.unwrap().available_tokens,
            100
        );
    }

    #[tokio::test]
    async fn test_buy_unknown_token() {
        let ledger = ledger();
        assert_eq!(
            ledger.buy_tokens(buy(42, 1)).await.unwrap_err(),
            LedgerError::NotFound(42)
        );
    }

    #[tokio::test]
    async fn test_concurrent_buys_never_oversell() {
        let ledger = Arc::new(ledger());
        let token_id = ledger.create_token(cafe("0xabc")).await.unwrap().id;

        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.buy_tokens(buy(token_id, 300)).await })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.buy_tokens(buy(token_id, 200)).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        let sold: i64 = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|r| r.purchase.amount)
            .sum();
        let failures = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::InsufficientSupply { .. })))
            .count();

        assert_eq!(failures, 1);
        let stored = ledger.get_token_by_id(token_id).await.unwrap();
        assert_eq!(stored.available_tokens, 400 - sold);
        assert!(stored.available_tokens >= 0);
        assert_eq!(stored.buyers.len(), 1);
    }

    #[tokio::test]
    async fn test_many_concurrent_single_unit_buys() {
        let ledger = Arc::new(ledger());
        let mut input = cafe("0xabc");
        input.revenue_estimate = dec!(2500); // 10 tokens
        let token = ledger.create_token(input).await.unwrap();
        assert_eq!(token.total_tokens, 10);
        let token_id = token.id;

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.buy_tokens(buy(token_id, 1)).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 10);
        let stored = ledger.get_token_by_id(token_id).await.unwrap();
        assert_eq!(stored.available_tokens, 0);
        assert_eq!(stored.buyers.len(), 10);
    }

    #[tokio::test]
    async fn test_restock_by_owner() {
        let ledger = ledger();
        let token = ledger.create_token(cafe("0xABC")).await.unwrap();
        ledger.buy_tokens(buy(token.id, 50)).await.unwrap();

        let updated = ledger.restock_tokens(token.id, 100, "0xabc").await.unwrap();
        assert_eq!(updated.total_tokens, 500);
        assert_eq!(updated.available_tokens, 450);
        assert_eq!(updated.total_value, dec!(25000));
        assert!(updated.last_restocked_at.is_some());
        assert_eq!(updated.buyers.len(), 1);
    }

    #[tokio::test]
    async fn test_restock_by_non_owner_changes_nothing() {
        let ledger = ledger();
        let token = ledger.create_token(cafe("0xabc")).await.unwrap();

        assert_eq!(
            ledger.restock_tokens(token.id, 100, "0xdef").await.unwrap_err(),
            LedgerError::Unauthorized
        );

        let stored = ledger.get_token_by_id(token.id).await.unwrap();
        assert_eq!(stored.total_tokens, 400);
        assert_eq!(stored.available_tokens, 400);
    }

    #[tokio::test]
    async fn test_restock_validation_and_missing() {
        let ledger = ledger();
        let token = ledger.create_token(cafe("0xabc")).await.unwrap();

        assert!(matches!(
            ledger.restock_tokens(token.id, 0, "0xabc").await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(
            ledger.restock_tokens(99, 10, "0xabc").await.unwrap_err(),
            LedgerError::NotFound(99)
        );
    }

    #[tokio::test]
    async fn test_restock_bounded_by_total_value_column() {
        let ledger = ledger();
        let token = ledger.create_token(cafe("0xabc")).await.unwrap();

        // 400 + N tokens at 50 each must stay below 10^20
        assert!(matches!(
            ledger.restock_tokens(token.id, 3_000_000_000_000_000_000, "0xabc").await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            ledger.restock_tokens(token.id, 2_000_000_000_000_000_000 - 400, "0xabc").await,
            Err(LedgerError::Validation(_))
        ));
        let stored = ledger.get_token_by_id(token.id).await.unwrap();
        assert_eq!(stored.total_tokens, 400);
        assert_eq!(stored.available_tokens, 400);
        assert!(stored.last_restocked_at.is_none());

        let updated = ledger
            .restock_tokens(token.id, 2_000_000_000_000_000_000 - 401, "0xabc")
            .await
            .unwrap();
        assert_eq!(updated.total_tokens, 1_999_999_999_999_999_999);
        assert_eq!(updated.total_value, dec!(99999999999999999950));
    }

    #[tokio::test]
    async fn test_buy_rejects_eth_amount_beyond_column_precision() {
        let ledger = ledger();
        let token = ledger.create_token(cafe("0xabc")).await.unwrap();

        let mut input = buy(token.id, 1);
        input.eth_amount_paid = Some(dec!(0.0000000000000000001));
        assert!(matches!(
            ledger.buy_tokens(input).await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(
            ledger.get_token_by_id(token.id).await.unwrap().available_tokens,
            400
        );
    }

    #[tokio::test]
    async fn test_get_all_newest_first_and_active_only() {
        let store = Arc::new(InMemoryTokenStore::new());
        let ledger = LedgerService::new(store.clone(), LedgerPolicy::default());

        let first = ledger.create_token(cafe("0xabc")).await.unwrap();
        let second = ledger.create_token(cafe("0xabc")).await.unwrap();

        let mut hidden = second.clone();
        hidden.id = 1000;
        hidden.is_active = false;
        store.insert_token(hidden).await.unwrap();

        let all = ledger.get_all_tokens().await.unwrap();
        let ids: Vec<i64> = all.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(all.iter().all(|t| t.is_active));
        assert_eq!(
            ledger.get_token_by_id(1000).await.unwrap_err(),
            LedgerError::NotFound(1000)
        );
    }

    /// Store whose calls never finish in time
    struct StalledStore;

    #[async_trait]
    impl TokenStore for StalledStore {
        async fn next_sequence(&self, _counter: &str) -> Result<i64, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        }
        async fn insert_token(&self, record: TokenRecord) -> Result<TokenRecord, StoreError> {
            Ok(record)
        }
        async fn find_active(&self, _id: i64) -> Result<Option<TokenRecord>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }
        async fn list_active(&self) -> Result<Vec<TokenRecord>, StoreError> {
            Err(StoreError::DatabaseError("connection refused".to_string()))
        }
        async fn purchase_if_available(
            &self,
            _id: i64,
            _purchase: PurchaseRecord,
        ) -> Result<PurchaseOutcome, StoreError> {
            Ok(PurchaseOutcome::NotFound)
        }
        async fn restock_if_owner(
            &self,
            _id: i64,
            _additional: i64,
            _owner: &str,
            _restocked_at: DateTime<Utc>,
        ) -> Result<RestockOutcome, StoreError> {
            Ok(RestockOutcome::NotFound)
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_surfaces_storage_error() {
        let ledger = LedgerService::new(
            Arc::new(StalledStore),
            LedgerPolicy {
                storage_timeout: Duration::from_millis(100),
                ..LedgerPolicy::default()
            },
        );

        assert!(matches!(
            ledger.get_token_by_id(1).await,
            Err(LedgerError::Storage(_))
        ));
        assert!(matches!(
            ledger.create_token(cafe("0xabc")).await,
            Err(LedgerError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_storage_error() {
        let ledger = LedgerService::new(Arc::new(StalledStore), LedgerPolicy::default());
        let err = ledger.get_all_tokens().await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
