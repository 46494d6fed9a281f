//! Business token endpoints
//!
//! GET  /api/tokens               list active tokens
//! POST /api/tokens/create        issue a new business token
//! POST /api/tokens/buy           purchase tokens
//! GET  /api/tokens/{id}          single token
//! POST /api/tokens/{id}/restock  owner adds supply

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use tracing::{error, info};

use crate::AppState;
use crate::models::token::{
    BuyTokensRequest, BuyTokensResponse, CreateTokenRequest, CreateTokenResponse, ErrorResponse,
    RestockTokensRequest, RestockTokensResponse, TokenListResponse, TokenResponse,
};
use crate::services::ledger::{BuyTokensInput, CreateTokenInput, LedgerError};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}

/// Map a ledger failure to its HTTP status and error body
pub fn ledger_error_response(err: LedgerError) -> ApiError {
    let status = match &err {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::Unauthorized => StatusCode::FORBIDDEN,
        LedgerError::InsufficientSupply { .. } => StatusCode::BAD_REQUEST,
        LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut body = ErrorResponse::new(err.to_string());
    if let LedgerError::InsufficientSupply { available, .. } = err {
        body.available_tokens = Some(available);
    }

    (status, Json(body))
}

fn parse_token_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| bad_request(format!("Invalid token id: {}", raw)))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| bad_request(format!("{} is required", field)))
}

impl TryFrom<CreateTokenRequest> for CreateTokenInput {
    type Error = ApiError;

    fn try_from(req: CreateTokenRequest) -> Result<Self, Self::Error> {
        let business_name = required_text(req.business_name, "businessName")?;
        let owner_address = required_text(req.owner_address, "ownerAddress")?;

        let revenue_estimate = req
            .revenue_estimate
            .ok_or_else(|| bad_request("revenueEstimate is required"))?
            .to_decimal()
            .ok_or_else(|| bad_request("revenueEstimate must be a number"))?;

        let tokenize_percentage = match req.tokenize_percentage {
            Some(raw) => Some(
                raw.to_decimal()
                    .ok_or_else(|| bad_request("tokenizePercentage must be a number"))?,
            ),
            None => None,
        };

        Ok(CreateTokenInput {
            business_name,
            description: req.description.unwrap_or_default(),
            revenue_estimate,
            tokenize_percentage,
            owner_address,
        })
    }
}

impl TryFrom<BuyTokensRequest> for BuyTokensInput {
    type Error = ApiError;

    fn try_from(req: BuyTokensRequest) -> Result<Self, Self::Error> {
        let token_id = req
            .token_id
            .ok_or_else(|| bad_request("tokenId is required"))?
            .to_i64()
            .ok_or_else(|| bad_request("tokenId must be an integer"))?;

        let amount = req
            .amount
            .ok_or_else(|| bad_request("amount is required"))?
            .to_i64()
            .ok_or_else(|| bad_request("amount must be a positive integer"))?;

        let buyer_address = required_text(req.buyer_address, "buyerAddress")?;

        let eth_amount_paid = match req.eth_amount_paid {
            Some(raw) => Some(
                raw.to_decimal()
                    .ok_or_else(|| bad_request("ethAmountPaid must be a number"))?,
            ),
            None => None,
        };

        Ok(BuyTokensInput {
            token_id,
            amount,
            buyer_address,
            payment_tx_hash: req.payment_tx_hash,
            eth_amount_paid,
        })
    }
}

pub async fn get_all_tokens(
    State(state): State<AppState>,
) -> Result<Json<TokenListResponse>, ApiError> {
    let tokens = state
        .ledger
        .get_all_tokens()
        .await
        .map_err(ledger_error_response)?;

    Ok(Json(TokenListResponse {
        success: true,
        total_count: tokens.len(),
        tokens,
        last_updated: Utc::now(),
    }))
}

pub async fn get_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token_id = parse_token_id(&id)?;
    let token = state
        .ledger
        .get_token_by_id(token_id)
        .await
        .map_err(ledger_error_response)?;

    Ok(Json(TokenResponse {
        success: true,
        token,
    }))
}

pub async fn create_token(
    State(state): State<AppState>,
    payload: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> Result<Json<CreateTokenResponse>, ApiError> {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let Json(payload) = payload.map_err(|e| bad_request(e.body_text()))?;
    let input = CreateTokenInput::try_from(payload)?;

    info!(
        correlation_id = %correlation_id,
        business = %input.business_name,
        "Token creation request received"
    );

    let token = state.ledger.create_token(input).await.map_err(|e| {
        error!(correlation_id = %correlation_id, error = %e, "Token creation failed");
        ledger_error_response(e)
    })?;

    Ok(Json(CreateTokenResponse {
        success: true,
        message: format!(
            "Created {} tokens for {}",
            token.total_tokens, token.business_name
        ),
        token,
    }))
}

pub async fn buy_tokens(
    State(state): State<AppState>,
    payload: Result<Json<BuyTokensRequest>, JsonRejection>,
) -> Result<Json<BuyTokensResponse>, ApiError> {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let Json(payload) = payload.map_err(|e| bad_request(e.body_text()))?;
    let input = BuyTokensInput::try_from(payload)?;

    info!(
        correlation_id = %correlation_id,
        token_id = input.token_id,
        amount = input.amount,
        "Token purchase request received"
    );

    let receipt = state.ledger.buy_tokens(input).await.map_err(|e| {
        info!(correlation_id = %correlation_id, error = %e, "Token purchase rejected");
        ledger_error_response(e)
    })?;

    Ok(Json(BuyTokensResponse {
        success: true,
        message: format!("Purchased {} tokens", receipt.purchase.amount),
        remaining_tokens: receipt.remaining_tokens,
        purchase: receipt.purchase,
    }))
}

pub async fn restock_tokens(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RestockTokensRequest>, JsonRejection>,
) -> Result<Json<RestockTokensResponse>, ApiError> {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let token_id = parse_token_id(&id)?;
    let Json(payload) = payload.map_err(|e| bad_request(e.body_text()))?;

    let additional_tokens = payload
        .additional_tokens
        .ok_or_else(|| bad_request("additionalTokens is required"))?
        .to_i64()
        .ok_or_else(|| bad_request("additionalTokens must be a positive integer"))?;
    let caller_address = required_text(payload.caller_address, "callerAddress")?;

    info!(
        correlation_id = %correlation_id,
        token_id = token_id,
        additional = additional_tokens,
        "Token restock request received"
    );

    let token = state
        .ledger
        .restock_tokens(token_id, additional_tokens, &caller_address)
        .await
        .map_err(|e| {
            info!(correlation_id = %correlation_id, error = %e, "Token restock rejected");
            ledger_error_response(e)
        })?;

    Ok(Json(RestockTokensResponse {
        success: true,
        message: format!(
            "Added {} tokens, {} now available",
            additional_tokens, token.available_tokens
        ),
        token,
    }))
}
