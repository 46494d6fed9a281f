//! Runtime configuration read from the environment (after `.env` is loaded)

use axum::http::HeaderValue;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::services::ledger::{
    AMOUNT_LIMIT, DEFAULT_PRICE_PER_TOKEN, DEFAULT_STORAGE_TIMEOUT, DEFAULT_TOKENIZE_PERCENTAGE,
    LedgerPolicy, MONEY_SCALE, fits_column,
};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue { key: &'static str, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { key, message } => {
                write!(f, "Invalid config {}: {}", key, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` runs the ledger on the in-memory store
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub price_per_token: Decimal,
    pub default_tokenize_percentage: Decimal,
    pub storage_timeout: Duration,
    /// `None` allows any origin
    pub cors_allow_origin: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            price_per_token: DEFAULT_PRICE_PER_TOKEN,
            default_tokenize_percentage: DEFAULT_TOKENIZE_PERCENTAGE,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            cors_allow_origin: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let price_per_token = match get("PRICE_PER_TOKEN") {
            Some(raw) => parse_decimal("PRICE_PER_TOKEN", &raw)?,
            None => defaults.price_per_token,
        };
        if price_per_token <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                key: "PRICE_PER_TOKEN",
                message: "must be greater than 0".to_string(),
            });
        }
        if !fits_column(price_per_token, AMOUNT_LIMIT, MONEY_SCALE) {
            return Err(ConfigError::InvalidValue {
                key: "PRICE_PER_TOKEN",
                message: "must be below 10^16 with at most 4 decimal places".to_string(),
            });
        }

        let default_tokenize_percentage = match get("DEFAULT_TOKENIZE_PERCENTAGE") {
            Some(raw) => parse_decimal("DEFAULT_TOKENIZE_PERCENTAGE", &raw)?,
            None => defaults.default_tokenize_percentage,
        };
        if default_tokenize_percentage <= Decimal::ZERO
            || default_tokenize_percentage > Decimal::ONE_HUNDRED
            || default_tokenize_percentage.normalize().scale() > MONEY_SCALE
        {
            return Err(ConfigError::InvalidValue {
                key: "DEFAULT_TOKENIZE_PERCENTAGE",
                message: "must be in (0, 100] with at most 4 decimal places".to_string(),
            });
        }

        let storage_timeout = match get("STORAGE_TIMEOUT_MS") {
            Some(raw) => {
                let ms = raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                    key: "STORAGE_TIMEOUT_MS",
                    message: e.to_string(),
                })?;
                if ms == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "STORAGE_TIMEOUT_MS",
                        message: "must be greater than 0".to_string(),
                    });
                }
                Duration::from_millis(ms)
            }
            None => defaults.storage_timeout,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            price_per_token,
            default_tokenize_percentage,
            storage_timeout,
            cors_allow_origin: get("CORS_ALLOW_ORIGIN"),
        })
    }

    pub fn ledger_policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            price_per_token: self.price_per_token,
            default_tokenize_percentage: self.default_tokenize_percentage,
            storage_timeout: self.storage_timeout,
        }
    }

    pub fn cors_layer(&self) -> Result<CorsLayer, ConfigError> {
        let origin = match self.cors_allow_origin.as_deref() {
            None | Some("*") => AllowOrigin::from(Any),
            Some(origin) => {
                let value = HeaderValue::from_str(origin).map_err(|e| ConfigError::InvalidValue {
                    key: "CORS_ALLOW_ORIGIN",
                    message: e.to_string(),
                })?;
                AllowOrigin::exact(value)
            }
        };

        Ok(CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any))
    }
}

fn parse_decimal(key: &'static str, raw: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(raw).map_err(|e| ConfigError::InvalidValue {
        key,
        message: e.to_string(),
    })
}
