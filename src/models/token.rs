//! Business token ledger records and the request/response models for the
//! `/api/tokens` endpoints.
//!
//! Field names are camelCase on the wire to match the dashboard client.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One tokenized business
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub id: i64,
    pub business_name: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub revenue_estimate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tokenize_percentage: Decimal,
    /// Policy price captured at creation; later policy changes do not touch it
    #[serde(with = "rust_decimal::serde::float")]
    pub price_per_token: Decimal,
    pub total_tokens: i64,
    pub available_tokens: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
    /// Lowercase wallet address, the authorization key for restocking
    pub owner_address: String,
    pub is_active: bool,
    /// Append-only, oldest first
    pub buyers: Vec<PurchaseRecord>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_restocked_at: Option<DateTime<Utc>>,
}

/// A single purchase appended to a token's buyer history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub buyer: String,
    pub amount: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_cost: Decimal,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub eth_amount_paid: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_tx_hash: Option<String>,
    pub is_paid_on_chain: bool,
    pub timestamp: DateTime<Utc>,
}

/// Numeric field the web client sends either as a JSON number or as a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(serde_json::Number),
    Text(String),
}

impl NumericInput {
    pub fn to_decimal(&self) -> Option<Decimal> {
        let raw = match self {
            NumericInput::Number(n) => n.to_string(),
            NumericInput::Text(s) => s.trim().to_string(),
        };
        if raw.is_empty() {
            return None;
        }
        Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .ok()
    }

    /// Whole numbers only; `"2.5"` is rejected rather than truncated
    pub fn to_i64(&self) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;

        let value = self.to_decimal()?;
        if !value.fract().is_zero() {
            return None;
        }
        value.to_i64()
    }
}

impl From<i64> for NumericInput {
    fn from(value: i64) -> Self {
        NumericInput::Number(value.into())
    }
}

impl From<&str> for NumericInput {
    fn from(value: &str) -> Self {
        NumericInput::Text(value.to_string())
    }
}

/// POST /api/tokens/create
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub revenue_estimate: Option<NumericInput>,
    #[serde(default)]
    pub tokenize_percentage: Option<NumericInput>,
    #[serde(default)]
    pub owner_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    pub success: bool,
    pub token: TokenRecord,
    pub message: String,
}

/// POST /api/tokens/buy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyTokensRequest {
    #[serde(default)]
    pub token_id: Option<NumericInput>,
    #[serde(default)]
    pub amount: Option<NumericInput>,
    #[serde(default)]
    pub buyer_address: Option<String>,
    #[serde(default)]
    pub payment_tx_hash: Option<String>,
    #[serde(default)]
    pub eth_amount_paid: Option<NumericInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyTokensResponse {
    pub success: bool,
    pub remaining_tokens: i64,
    pub purchase: PurchaseRecord,
    pub message: String,
}

/// POST /api/tokens/{id}/restock
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockTokensRequest {
    #[serde(default)]
    pub additional_tokens: Option<NumericInput>,
    #[serde(default, alias = "ownerAddress")]
    pub caller_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockTokensResponse {
    pub success: bool,
    pub token: TokenRecord,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListResponse {
    pub success: bool,
    pub tokens: Vec<TokenRecord>,
    pub total_count: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub success: bool,
    pub token: TokenRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    /// Set only for insufficient supply failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_tokens: Option<i64>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            available_tokens: None,
        }
    }
}
