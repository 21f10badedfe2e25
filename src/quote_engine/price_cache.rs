use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{PriceFeedError, QuoteError};
use crate::quote_engine::price_source::PriceSource;
use crate::quote_engine::{out_of_range, round_fiat};

/// Currencies reported by `spread`, in order
pub const SPREAD_CURRENCIES: [&str; 3] = ["usd", "eur", "inr"];

/// Last-resort rate when even the default currency has no fallback entry
const DEFAULT_FALLBACK_RATE: Decimal = dec!(3000);

/// Price feed cache configuration
#[derive(Debug, Clone)]
pub struct PriceCacheConfig {
    /// How long a successful fetch is trusted
    pub ttl: Duration,
    /// After a failure, how long to wait before asking upstream again
    pub failure_cooldown: Duration,
    /// Upper bound for a single upstream call
    pub fetch_timeout: Duration,
    /// Native asset identifier at the price source ("ethereum")
    pub base_asset: String,
    pub default_currency: String,
    /// Static rates used whenever live data is unavailable
    pub fallback_rates: HashMap<String, Decimal>,
}

impl Default for PriceCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(2 * 60),
            failure_cooldown: Duration::from_secs(5 * 60),
            fetch_timeout: Duration::from_secs(5),
            base_asset: "ethereum".to_string(),
            default_currency: "usd".to_string(),
            fallback_rates: HashMap::from([
                ("usd".to_string(), dec!(3000)),
                ("eur".to_string(), dec!(2800)),
                ("inr".to_string(), dec!(250000)),
            ]),
        }
    }
}

/// Rates for one unit of the native asset, replaced wholesale on refresh
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    pub values: HashMap<String, Decimal>,
    pub fetched_at: DateTime<Utc>,
}

/// Derived cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Within TTL of the last successful fetch
    Fresh,
    /// TTL expired (or never fetched) and no cooldown; next read refreshes
    Stale,
    /// Last fetch failed within the cooldown window; reads use fallback rates
    Cooldown,
}

/// Fiat value of an amount in one currency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiatValue {
    pub currency: String,
    pub value: Decimal,
}

#[derive(Default)]
struct CacheInner {
    snapshot: Option<Arc<PriceSnapshot>>,
    last_failure_at: Option<DateTime<Utc>>,
}

enum Lookup {
    Hit(Decimal),
    Fallback,
    Refresh,
}

/// Fiat price feed for the native asset.
///
/// `get_rate` never fails: it serves the cached snapshot while fresh, asks
/// the upstream source at most once per TTL, stops asking for a cooldown
/// period after a failure, and otherwise answers from the static table.
/// Concurrent refreshes are collapsed into a single upstream call.
pub struct PriceFeedCache {
    config: PriceCacheConfig,
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    inner: RwLock<CacheInner>,
    refresh: tokio::sync::Mutex<()>,
}

impl PriceFeedCache {
    pub fn new(config: PriceCacheConfig, source: Arc<dyn PriceSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            source,
            clock,
            inner: RwLock::new(CacheInner::default()),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    pub fn default_currency(&self) -> &str {
        &self.config.default_currency
    }

    /// Rate for one unit of the native asset in `currency` (case-insensitive)
    pub async fn get_rate(&self, currency: &str) -> Decimal {
        let key = currency.trim().to_ascii_lowercase();

        match self.lookup(&key) {
            Lookup::Hit(rate) => return rate,
            Lookup::Fallback => return self.fallback_rate(&key),
            Lookup::Refresh => {}
        }

        let _flight = self.refresh.lock().await;

        // Another caller may have refreshed (or failed) while we waited
        match self.lookup(&key) {
            Lookup::Hit(rate) => return rate,
            Lookup::Fallback => return self.fallback_rate(&key),
            Lookup::Refresh => {}
        }

        match self.refresh_snapshot().await {
            Some(snapshot) => self.rate_from(&snapshot, &key),
            None => self.fallback_rate(&key),
        }
    }

    /// Convert a native amount to fiat, rounded to 6 decimal places
    pub async fn convert(&self, amount_native: Decimal, currency: &str) -> Result<Decimal, QuoteError> {
        if amount_native <= Decimal::ZERO {
            return Err(QuoteError::InvalidAmount(format!(
                "amount must be positive, got {}",
                amount_native
            )));
        }

        let rate = self.get_rate(currency).await;
        amount_native
            .checked_mul(rate)
            .map(round_fiat)
            .ok_or_else(|| out_of_range(amount_native))
    }

    /// Native amount converted to every spread currency at once
    pub async fn spread(&self, amount_native: Decimal) -> Result<Vec<FiatValue>, QuoteError> {
        let conversions = futures::future::join_all(
            SPREAD_CURRENCIES
                .iter()
                .map(|currency| self.convert(amount_native, currency)),
        )
        .await;

        SPREAD_CURRENCIES
            .iter()
            .zip(conversions)
            .map(|(currency, value)| {
                Ok(FiatValue {
                    currency: currency.to_ascii_uppercase(),
                    value: value?,
                })
            })
            .collect()
    }

    pub fn state(&self) -> CacheState {
        let now = self.clock.now();
        self.state_of(&self.inner.read(), now)
    }

    pub fn snapshot(&self) -> Option<Arc<PriceSnapshot>> {
        self.inner.read().snapshot.clone()
    }

    fn state_of(&self, inner: &CacheInner, now: DateTime<Utc>) -> CacheState {
        if let Some(snapshot) = &inner.snapshot {
            if within(now - snapshot.fetched_at, self.config.ttl) {
                return CacheState::Fresh;
            }
        }

        if let Some(failed_at) = inner.last_failure_at {
            if within(now - failed_at, self.config.failure_cooldown) {
                return CacheState::Cooldown;
            }
        }

        CacheState::Stale
    }

    fn lookup(&self, key: &str) -> Lookup {
        let now = self.clock.now();
        let inner = self.inner.read();

        match (self.state_of(&inner, now), &inner.snapshot) {
            (CacheState::Fresh, Some(snapshot)) => {
                debug!("✓ Price cache hit for {}", key);
                Lookup::Hit(self.rate_from(snapshot, key))
            }
            (CacheState::Cooldown, _) => {
                debug!("⏸ Price source in cooldown, using fallback for {}", key);
                Lookup::Fallback
            }
            _ => Lookup::Refresh,
        }
    }

    async fn refresh_snapshot(&self) -> Option<Arc<PriceSnapshot>> {
        let started_at = self.clock.now();
        let timeout = self.config.fetch_timeout;

        let result = match tokio::time::timeout(timeout, self.source.fetch(&self.config.base_asset)).await {
            Ok(result) => result,
            Err(_) => Err(PriceFeedError::Timeout(timeout.as_millis() as u64)),
        };

        let mut inner = self.inner.write();
        match result {
            Ok(values) => {
                let snapshot = Arc::new(PriceSnapshot {
                    values: values
                        .into_iter()
                        .map(|(currency, rate)| (currency.to_ascii_lowercase(), rate))
                        .collect(),
                    fetched_at: started_at,
                });

                // Never let an older fetch replace a newer snapshot
                let is_newer = inner
                    .snapshot
                    .as_ref()
                    .map_or(true, |current| current.fetched_at <= started_at);
                if is_newer {
                    inner.snapshot = Some(snapshot.clone());
                }
                inner.last_failure_at = None;

                info!(
                    "✓ Refreshed {} prices from {} ({} currencies)",
                    self.config.base_asset,
                    self.source.name(),
                    snapshot.values.len()
                );
                Some(snapshot)
            }
            Err(e) => {
                inner.last_failure_at = Some(started_at);
                warn!(
                    "⚠️ Price source {} failed, serving fallback rates for {:?}: {}",
                    self.source.name(),
                    self.config.failure_cooldown,
                    e
                );
                None
            }
        }
    }

    fn rate_from(&self, snapshot: &PriceSnapshot, key: &str) -> Decimal {
        match snapshot.values.get(key) {
            Some(rate) => *rate,
            None => {
                warn!("⚠️ {} not served by {}, using fallback rate", key, self.source.name());
                self.fallback_rate(key)
            }
        }
    }

    fn fallback_rate(&self, key: &str) -> Decimal {
        self.config
            .fallback_rates
            .get(key)
            .or_else(|| self.config.fallback_rates.get(&self.config.default_currency))
            .copied()
            .unwrap_or(DEFAULT_FALLBACK_RATE)
    }
}

/// A negative elapsed time (clock stepped back) counts as within the window
fn within(elapsed: chrono::Duration, window: Duration) -> bool {
    elapsed.to_std().map_or(true, |elapsed| elapsed < window)
}
