use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::models::*;
use crate::{
    api::websocket::SettlementEventBus,
    error::{AppError, AppResult},
    ledger::{
        models::{ChainId, Quote, SettlementRecord, TransferRequest},
        repository::{ChainSummary, MetricsRepository, DEFAULT_LIST_LIMIT},
    },
    middleware::RateLimitLayer,
    quote_engine::{engine::parse_native_amount, PriceFeedCache, QuoteEstimator},
    settlement::{simulator::DEFAULT_SIMULATION_COUNT, LoadSimulator, SettlementScheduler},
};

#[derive(Clone)]
pub struct AppState {
    pub price_feed: Arc<PriceFeedCache>,
    pub quote_estimator: Arc<QuoteEstimator>,
    pub scheduler: Arc<SettlementScheduler>,
    pub metrics: Arc<MetricsRepository>,
    pub events: Arc<SettlementEventBus>,
    pub simulator: Arc<LoadSimulator>,
    pub rate_limiter: Arc<RateLimitLayer>,
}

/// Health check
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let accepting = state.scheduler.is_accepting();

    Json(HealthResponse {
        status: if accepting { "healthy" } else { "draining" }.to_string(),
        timestamp: Utc::now(),
        accepting_transfers: accepting,
        pending_settlements: state.scheduler.pending_count(),
        event_subscribers: state.events.subscriber_count(),
        price_feed: state.price_feed.state(),
    })
}

/// Quote a transfer
/// GET /api/crosschain/quote?from=sepolia&to=optimism&amount=1.0
pub async fn get_quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> AppResult<Json<Quote>> {
    let from = chain_param("from", &query.from)?;
    let to = chain_param("to", &query.to)?;
    let amount = parse_native_amount(&query.amount)?;

    let quote = match query.currency.as_deref() {
        Some(currency) if !currency.trim().is_empty() => {
            state.quote_estimator.quote_in(amount, &from, &to, currency).await?
        }
        _ => state.quote_estimator.quote(amount, &from, &to).await?,
    };

    Ok(Json(quote))
}

/// Enqueue a transfer for simulated settlement
/// POST /api/crosschain/enqueue
pub async fn enqueue_transfer(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> AppResult<Json<EnqueueResponse>> {
    let from = chain_param("from_chain", &request.from_chain)?;
    let to = chain_param("to_chain", &request.to_chain)?;
    let amount = amount_from_json(&request.amount_native)?;

    let quote = match request.quote {
        // Only figures this service would have issued are trusted
        Some(quote) => {
            state.quote_estimator.verify(&quote)?;
            quote
        }
        None => state.quote_estimator.quote(amount, &from, &to).await?,
    };

    let transfer = TransferRequest {
        from_chain: from,
        to_chain: to,
        amount_native: amount,
        recipient: request.recipient,
    };
    let receipt = state.scheduler.enqueue(transfer, &quote)?;

    Ok(Json(EnqueueResponse {
        tx_id: receipt.tx_id,
        estimated_delay_seconds: receipt.estimated_delay_seconds,
        quote,
    }))
}

/// Transfers waiting for their settlement timer
/// GET /api/crosschain/pending
pub async fn list_pending(State(state): State<AppState>) -> Json<PendingResponse> {
    let pending = state.scheduler.pending();
    Json(PendingResponse {
        count: pending.len(),
        pending,
    })
}

/// GET /api/fx/convert?amount=0.01&to=eur
pub async fn fx_convert(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> AppResult<Json<ConvertResponse>> {
    let amount = parse_native_amount(&query.amount)?;
    let currency = query
        .to
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| state.price_feed.default_currency().to_string());

    let value = state.price_feed.convert(amount, &currency).await?;

    Ok(Json(ConvertResponse {
        amount_native: amount,
        currency,
        value,
        price_feed: state.price_feed.state(),
    }))
}

/// GET /api/fx/spread?amount=0.01
pub async fn fx_spread(
    State(state): State<AppState>,
    Query(query): Query<SpreadQuery>,
) -> AppResult<Json<SpreadResponse>> {
    let amount = parse_native_amount(&query.amount)?;
    let values = state.price_feed.spread(amount).await?;

    Ok(Json(SpreadResponse {
        amount_native: amount,
        values,
    }))
}

/// GET /api/fx/status
pub async fn fx_status(State(state): State<AppState>) -> Json<PriceFeedStatus> {
    let snapshot = state.price_feed.snapshot();
    let mut currencies: Vec<String> = snapshot
        .as_ref()
        .map(|s| s.values.keys().cloned().collect())
        .unwrap_or_default();
    currencies.sort();

    Json(PriceFeedStatus {
        state: state.price_feed.state(),
        fetched_at: snapshot.map(|s| s.fetched_at),
        currencies,
    })
}

/// GET /api/metrics/summary
pub async fn metrics_summary(State(state): State<AppState>) -> Json<Vec<ChainSummary>> {
    Json(state.metrics.summary())
}

/// GET /api/metrics/all?limit=500
pub async fn metrics_all(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<SettlementRecord>> {
    Json(state.metrics.all(query.limit.unwrap_or(DEFAULT_LIST_LIMIT)))
}

/// POST /api/metrics/clear
pub async fn metrics_clear(State(state): State<AppState>) -> Json<ClearResponse> {
    let removed = state.metrics.clear();
    Json(ClearResponse { ok: true, removed })
}

/// Synthetic load for the dashboard
/// POST /api/simulate/run
pub async fn run_simulation(
    State(state): State<AppState>,
    body: Option<Json<SimulateRequest>>,
) -> Json<SimulateResponse> {
    let count = body
        .and_then(|Json(request)| request.count)
        .unwrap_or(DEFAULT_SIMULATION_COUNT);

    info!("🧪 Running load simulation ({} transfers)", count);
    let count = state.simulator.simulate(count).await;

    Json(SimulateResponse { ok: true, count })
}

fn chain_param(name: &str, value: &str) -> AppResult<ChainId> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidInput(format!("Missing {} parameter", name)));
    }
    Ok(ChainId::new(value))
}
