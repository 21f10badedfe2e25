use config::ConfigError;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::ledger::models::ChainId;
use crate::quote_engine::price_source::COINGECKO_SIMPLE_PRICE_URL;
use crate::quote_engine::{PriceCacheConfig, QuoteConfig};
use crate::settlement::{SchedulerConfig, ShutdownPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub price_source_url: String,
    pub price_asset_id: String,
    pub price_fetch_timeout: Duration,
    pub price_cache_ttl: Duration,
    pub price_failure_cooldown: Duration,
    pub primary_fiat: String,
    pub hub_chain: String,
    pub settlement_min_delay_ms: u64,
    pub settlement_jitter_ms: u64,
    pub settlement_delay_floor_ms: u64,
    pub shutdown_policy: ShutdownPolicy,
    pub cors_allowed_origins: Vec<String>,
    pub rate_limit_per_minute: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            bind_address: text("BIND_ADDRESS", "0.0.0.0:8080"),
            price_source_url: text("PRICE_SOURCE_URL", COINGECKO_SIMPLE_PRICE_URL),
            price_asset_id: text("PRICE_ASSET_ID", "ethereum"),
            price_fetch_timeout: Duration::from_millis(parse(&lookup, "PRICE_FETCH_TIMEOUT_MS", 5000)?),
            price_cache_ttl: Duration::from_secs(parse(&lookup, "PRICE_CACHE_TTL_SECS", 120)?),
            price_failure_cooldown: Duration::from_secs(parse(
                &lookup,
                "PRICE_FAILURE_COOLDOWN_SECS",
                300,
            )?),
            primary_fiat: text("PRIMARY_FIAT", "usd").to_ascii_lowercase(),
            hub_chain: text("HUB_CHAIN", "sepolia"),
            settlement_min_delay_ms: parse(&lookup, "SETTLEMENT_MIN_DELAY_MS", 2000)?,
            settlement_jitter_ms: parse(&lookup, "SETTLEMENT_JITTER_MS", 1000)?,
            settlement_delay_floor_ms: parse(&lookup, "SETTLEMENT_DELAY_FLOOR_MS", 1000)?,
            shutdown_policy: parse(&lookup, "SETTLEMENT_SHUTDOWN_POLICY", ShutdownPolicy::Flush)?,
            cors_allowed_origins: text("CORS_ALLOWED_ORIGINS", "http://localhost:3000")
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            rate_limit_per_minute: parse(&lookup, "RATE_LIMIT_PER_MINUTE", 120)?,
        })
    }

    pub fn price_cache_config(&self) -> PriceCacheConfig {
        PriceCacheConfig {
            ttl: self.price_cache_ttl,
            failure_cooldown: self.price_failure_cooldown,
            fetch_timeout: self.price_fetch_timeout,
            base_asset: self.price_asset_id.clone(),
            default_currency: self.primary_fiat.clone(),
            ..PriceCacheConfig::default()
        }
    }

    pub fn quote_config(&self) -> QuoteConfig {
        QuoteConfig {
            hub_chain: ChainId::new(self.hub_chain.clone()),
            ..QuoteConfig::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            min_delay_ms: self.settlement_min_delay_ms,
            jitter_range_ms: self.settlement_jitter_ms,
            delay_floor_ms: self.settlement_delay_floor_ms,
            ..SchedulerConfig::default()
        }
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ConfigError::Message(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
