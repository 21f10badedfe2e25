use std::sync::Arc;
use tracing::info;

use crate::{
    api::{handler::AppState, websocket::SettlementEventBus},
    clock::{Clock, MonotonicClock},
    config::Config,
    error::AppResult,
    ledger::MetricsRepository,
    middleware::RateLimitLayer,
    quote_engine::{
        price_cache::SPREAD_CURRENCIES, CoinGeckoSource, PriceFeedCache, PriceSource, QuoteEstimator,
    },
    settlement::{LoadSimulator, RandomJitter, SettlementScheduler},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let mut vs_currencies: Vec<String> = SPREAD_CURRENCIES.iter().map(|c| c.to_string()).collect();
    if !vs_currencies.contains(&config.primary_fiat) {
        vs_currencies.push(config.primary_fiat.clone());
    }
    let source = Arc::new(CoinGeckoSource::new(
        config.price_source_url.clone(),
        vs_currencies,
        config.price_fetch_timeout,
    ));
    info!("✅ Price source: {} ({})", source.name(), config.price_source_url);

    let state = build_state(config, source);

    // Warm the cache; a failure here only starts the cooldown
    let rate = state.price_feed.get_rate(&config.primary_fiat).await;
    info!(
        "✅ Price feed ready: 1 {} = {} {} ({:?})",
        config.price_asset_id,
        rate,
        config.primary_fiat.to_ascii_uppercase(),
        state.price_feed.state()
    );

    Ok(state)
}

/// Wire every component around the given price source
pub fn build_state(config: &Config, source: Arc<dyn PriceSource>) -> AppState {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());

    let price_feed = Arc::new(PriceFeedCache::new(
        config.price_cache_config(),
        source,
        clock.clone(),
    ));
    let quote_estimator = Arc::new(QuoteEstimator::new(config.quote_config(), price_feed.clone()));

    let metrics = Arc::new(MetricsRepository::new());
    let events = Arc::new(SettlementEventBus::new());

    let scheduler = Arc::new(SettlementScheduler::new(
        config.scheduler_config(),
        metrics.clone(),
        events.clone(),
        clock.clone(),
        Arc::new(RandomJitter),
    ));
    info!(
        "✅ Settlement scheduler ready (min delay {}ms, jitter ±{}ms, shutdown policy {:?})",
        config.settlement_min_delay_ms, config.settlement_jitter_ms, config.shutdown_policy
    );

    let simulator = Arc::new(LoadSimulator::new(metrics.clone(), events.clone(), clock));

    AppState {
        price_feed,
        quote_estimator,
        scheduler,
        metrics,
        events,
        simulator,
        rate_limiter: Arc::new(RateLimitLayer::per_minute(config.rate_limit_per_minute)),
    }
}
