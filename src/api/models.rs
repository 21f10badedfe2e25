use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::QuoteError;
use crate::ledger::models::{PendingSettlement, Quote, TxId};
use crate::quote_engine::engine::parse_native_amount;
use crate::quote_engine::price_cache::{CacheState, FiatValue};

// ========== REQUEST MODELS ==========

/// GET /api/crosschain/quote?from=sepolia&to=optimism&amount=0.5&currency=eur
#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub from: String,
    pub to: String,
    pub amount: String,
    pub currency: Option<String>,
}

/// Transfer to enqueue. When `quote` is absent a fresh one is computed.
#[derive(Debug, Deserialize, Validate)]
pub struct EnqueueRequest {
    #[validate(length(min = 1, max = 64, message = "chain id must be 1-64 characters"))]
    pub from_chain: String,

    #[validate(length(min = 1, max = 64, message = "chain id must be 1-64 characters"))]
    pub to_chain: String,

    /// Number or numeric string; checked by the handler
    pub amount_native: serde_json::Value,

    #[validate(length(min = 1, max = 128, message = "recipient is required"))]
    pub recipient: String,

    #[serde(default)]
    pub quote: Option<Quote>,
}

/// GET /api/fx/convert?amount=0.01&to=inr
#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    pub amount: String,
    pub to: Option<String>,
}

/// GET /api/fx/spread?amount=0.01
#[derive(Debug, Deserialize)]
pub struct SpreadQuery {
    pub amount: String,
}

/// GET /api/metrics/all?limit=100
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SimulateRequest {
    pub count: Option<usize>,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub tx_id: TxId,
    pub estimated_delay_seconds: u64,
    pub quote: Quote,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub count: usize,
    pub pending: Vec<PendingSettlement>,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub amount_native: Decimal,
    pub currency: String,
    pub value: Decimal,
    pub price_feed: CacheState,
}

#[derive(Debug, Serialize)]
pub struct SpreadResponse {
    pub amount_native: Decimal,
    pub values: Vec<FiatValue>,
}

#[derive(Debug, Serialize)]
pub struct PriceFeedStatus {
    pub state: CacheState,
    pub fetched_at: Option<DateTime<Utc>>,
    pub currencies: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub ok: bool,
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    pub ok: bool,
    pub count: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub accepting_transfers: bool,
    pub pending_settlements: usize,
    pub event_subscribers: usize,
    pub price_feed: CacheState,
}

/// Amount from a JSON body: a number (`0.5`) or numeric string (`"0.5"`)
pub fn amount_from_json(value: &serde_json::Value) -> Result<Decimal, QuoteError> {
    match value {
        serde_json::Value::Number(number) => parse_native_amount(&number.to_string()),
        serde_json::Value::String(text) => parse_native_amount(text),
        other => Err(QuoteError::InvalidAmount(format!("expected a number, got {}", other))),
    }
}
