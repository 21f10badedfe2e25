use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::QuoteError;
use crate::ledger::models::{ChainId, HopBreakdown, Quote, Route};
use crate::quote_engine::price_cache::PriceFeedCache;
use crate::quote_engine::{out_of_range, round_fiat, round_native};

/// Quote estimator configuration (fixed protocol parameters)
#[derive(Debug, Clone)]
pub struct QuoteConfig {
    /// Relay chain every cross-chain transfer is routed through
    pub hub_chain: ChainId,
    /// Flat fee charged per hop
    pub base_fee_native: Decimal,
    /// Proportional fee per hop in basis points (15 = 0.15%)
    pub fee_rate_bps: Decimal,
    /// Bridge processing time added to every hop
    pub processing_seconds: u64,
    /// Latency class for chains missing from `latency_classes`
    pub default_latency_seconds: u64,
    /// Expected per-hop propagation seconds per chain
    pub latency_classes: HashMap<ChainId, u64>,
    /// Originating-chain send cost
    pub local_send_cost_native: Decimal,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            hub_chain: ChainId::from("sepolia"),
            base_fee_native: dec!(0.00005),
            fee_rate_bps: dec!(15),
            processing_seconds: 2,
            default_latency_seconds: 5,
            latency_classes: HashMap::from([
                (ChainId::from("sepolia"), 8), // L1
                (ChainId::from("optimism"), 3),
                (ChainId::from("zksync"), 4),
                (ChainId::from("polygonAmoy"), 3),
            ]),
            local_send_cost_native: dec!(0.00001),
        }
    }
}

/// Quote estimator - deterministic route, fee and latency figures.
///
/// The only input that is not a fixed parameter is the fiat rate, read from
/// the price feed cache. `estimate` is the pure core; `quote` adds the rate
/// lookup in front of it.
pub struct QuoteEstimator {
    config: QuoteConfig,
    prices: Arc<PriceFeedCache>,
}

impl QuoteEstimator {
    pub fn new(config: QuoteConfig, prices: Arc<PriceFeedCache>) -> Self {
        Self { config, prices }
    }

    /// Quote in the service's primary fiat currency
    pub async fn quote(
        &self,
        amount_native: Decimal,
        from_chain: &ChainId,
        to_chain: &ChainId,
    ) -> Result<Quote, QuoteError> {
        let currency = self.prices.default_currency().to_string();
        self.quote_in(amount_native, from_chain, to_chain, &currency).await
    }

    /// Quote with total cost expressed in `currency`
    pub async fn quote_in(
        &self,
        amount_native: Decimal,
        from_chain: &ChainId,
        to_chain: &ChainId,
        currency: &str,
    ) -> Result<Quote, QuoteError> {
        // Reject before touching the price feed
        validate_amount(amount_native)?;

        let currency = currency.trim().to_ascii_lowercase();
        let fx_rate = self.prices.get_rate(&currency).await;
        let quote = self.estimate(amount_native, from_chain, to_chain, &currency, fx_rate)?;

        info!(
            "✓ Quote {} -> {} for {}: fee {} ({}s), total {} {}",
            from_chain,
            to_chain,
            quote.amount_native,
            quote.total_fee_native,
            quote.estimated_latency_seconds,
            quote.total_cost_fiat,
            currency.to_ascii_uppercase()
        );

        Ok(quote)
    }

    /// Build a quote from explicit inputs, without any I/O
    pub fn estimate(
        &self,
        amount_native: Decimal,
        from_chain: &ChainId,
        to_chain: &ChainId,
        fiat_currency: &str,
        fx_rate: Decimal,
    ) -> Result<Quote, QuoteError> {
        let amount = validate_amount(amount_native)?;
        let route = self.build_route(from_chain, to_chain);

        let mut breakdown = Vec::with_capacity(route.len() - 1);
        let mut bridge_fee = Decimal::ZERO;
        let mut latency_seconds = 0u64;

        for (src, dst) in route.hops() {
            let hop_fee = amount
                .checked_mul(self.config.fee_rate_bps)
                .map(|proportional| proportional / dec!(10000))
                .and_then(|proportional| self.config.base_fee_native.checked_add(proportional))
                .ok_or_else(|| out_of_range(amount))?;
            let hop_latency =
                self.latency_class(src) + self.latency_class(dst) + self.config.processing_seconds;

            bridge_fee = bridge_fee.checked_add(hop_fee).ok_or_else(|| out_of_range(amount))?;
            latency_seconds += hop_latency;
            breakdown.push(HopBreakdown {
                from: src.clone(),
                to: dst.clone(),
                fee_native: round_native(hop_fee),
                latency_seconds: hop_latency,
            });
        }

        let bridge_fee_native = round_native(bridge_fee);
        let local_send_cost_native = round_native(self.config.local_send_cost_native);
        let total_fee_native = bridge_fee_native
            .checked_add(local_send_cost_native)
            .ok_or_else(|| out_of_range(amount))?;
        let total_cost_fiat = amount
            .checked_add(total_fee_native)
            .and_then(|total| total.checked_mul(fx_rate))
            .map(round_fiat)
            .ok_or_else(|| out_of_range(amount))?;

        Ok(Quote {
            route,
            amount_native: amount,
            bridge_fee_native,
            local_send_cost_native,
            total_fee_native,
            estimated_latency_seconds: latency_seconds,
            fiat_currency: fiat_currency.to_ascii_lowercase(),
            fx_rate,
            total_cost_fiat,
            breakdown,
        })
    }

    /// Accept a caller-supplied quote only if it is exactly what this
    /// estimator produces for the same endpoints, amount and rate
    pub fn verify(&self, quote: &Quote) -> Result<(), QuoteError> {
        if quote.fx_rate <= Decimal::ZERO {
            return Err(QuoteError::Inconsistent(format!(
                "fx rate must be positive, got {}",
                quote.fx_rate
            )));
        }

        let expected = self.estimate(
            quote.amount_native,
            quote.route.source(),
            quote.route.destination(),
            &quote.fiat_currency,
            quote.fx_rate,
        )?;
        if &expected != quote {
            return Err(QuoteError::Inconsistent(format!(
                "figures for {} -> {} ({} native at {} {}) were not issued by this service",
                quote.route.source(),
                quote.route.destination(),
                quote.amount_native,
                quote.fx_rate,
                quote.fiat_currency
            )));
        }
        Ok(())
    }

    /// Same chain: `[chain]`. Otherwise hub-and-spoke: `[from, hub, to]`.
    pub fn build_route(&self, from_chain: &ChainId, to_chain: &ChainId) -> Route {
        if from_chain == to_chain {
            return Route::direct(from_chain.clone());
        }
        Route::via_hub(from_chain.clone(), self.config.hub_chain.clone(), to_chain.clone())
    }

    /// Expected per-hop propagation seconds; unknown chains get the default
    pub fn latency_class(&self, chain: &ChainId) -> u64 {
        match self.config.latency_classes.get(chain) {
            Some(seconds) => *seconds,
            None => {
                debug!(
                    "Unknown chain {}, using default latency class {}s",
                    chain, self.config.default_latency_seconds
                );
                self.config.default_latency_seconds
            }
        }
    }
}

/// Positive amount, normalised to native precision
fn validate_amount(amount_native: Decimal) -> Result<Decimal, QuoteError> {
    if amount_native <= Decimal::ZERO {
        return Err(QuoteError::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount_native
        )));
    }

    let amount = round_native(amount_native);
    if amount.is_zero() {
        return Err(QuoteError::InvalidAmount(format!(
            "{} is below native precision",
            amount_native
        )));
    }
    Ok(amount)
}

/// Parse a caller-supplied native amount ("0.001", "1e-3")
pub fn parse_native_amount(raw: &str) -> Result<Decimal, QuoteError> {
    let trimmed = raw.trim();
    let amount = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| QuoteError::InvalidAmount(format!("not a finite number: {:?}", raw)))?;

    validate_amount(amount)?;
    Ok(amount)
}
