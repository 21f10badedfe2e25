use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::PriceFeedError;

/// CoinGecko simple price endpoint
pub const COINGECKO_SIMPLE_PRICE_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Upstream fiat price source. The price feed cache is its only consumer.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Rates for one unit of `base_asset`, keyed by lowercase currency code
    async fn fetch(&self, base_asset: &str) -> Result<HashMap<String, Decimal>, PriceFeedError>;

    fn name(&self) -> &str;
}

/// CoinGecko simple price client
pub struct CoinGeckoSource {
    client: Client,
    url: String,
    vs_currencies: Vec<String>,
    timeout: Duration,
}

impl CoinGeckoSource {
    pub fn new(url: impl Into<String>, vs_currencies: Vec<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            vs_currencies,
            timeout,
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn fetch(&self, base_asset: &str) -> Result<HashMap<String, Decimal>, PriceFeedError> {
        let vs = self.vs_currencies.join(",");
        debug!("Fetching {} prices in [{}] from CoinGecko", base_asset, vs);

        let response = self
            .client
            .get(&self.url)
            .query(&[("ids", base_asset), ("vs_currencies", vs.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PriceFeedError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    PriceFeedError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(PriceFeedError::Http(response.status().as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PriceFeedError::Malformed(e.to_string()))?;

        parse_simple_price(&body, base_asset)
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}

/// Parse `{"<asset>": {"usd": 3000.5, ...}}`
pub fn parse_simple_price(
    body: &serde_json::Value,
    base_asset: &str,
) -> Result<HashMap<String, Decimal>, PriceFeedError> {
    let prices = body
        .get(base_asset)
        .and_then(|p| p.as_object())
        .ok_or_else(|| PriceFeedError::Malformed(format!("missing `{}` object", base_asset)))?;

    let mut rates = HashMap::with_capacity(prices.len());
    for (currency, value) in prices {
        let serde_json::Value::Number(number) = value else {
            return Err(PriceFeedError::Malformed(format!("non-numeric rate for {}", currency)));
        };
        let text = number.to_string();
        let rate = Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|e| PriceFeedError::Malformed(format!("{}: {}", currency, e)))?;
        if rate <= Decimal::ZERO {
            return Err(PriceFeedError::Malformed(format!(
                "non-positive rate for {}: {}",
                currency, rate
            )));
        }
        rates.insert(currency.to_ascii_lowercase(), rate);
    }

    if rates.is_empty() {
        return Err(PriceFeedError::Malformed("empty rate table".to_string()));
    }

    Ok(rates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_simple_price() {
        let body = serde_json::json!({
            "ethereum": { "usd": 3012.45, "EUR": 2790, "inr": 251000.5 }
        });

        let rates = parse_simple_price(&body, "ethereum").unwrap();
        assert_eq!(rates["usd"], dec!(3012.45));
        assert_eq!(rates["eur"], dec!(2790));
        assert_eq!(rates["inr"], dec!(251000.5));
    }

    #[test]
    fn test_parse_rejects_unexpected_shape() {
        let missing = serde_json::json!({ "status": { "error_code": 429 } });
        assert!(matches!(
            parse_simple_price(&missing, "ethereum"),
            Err(PriceFeedError::Malformed(_))
        ));

        let empty = serde_json::json!({ "ethereum": {} });
        assert!(parse_simple_price(&empty, "ethereum").is_err());

        let text = serde_json::json!({ "ethereum": { "usd": "3000" } });
        assert!(parse_simple_price(&text, "ethereum").is_err());

        for rate in [serde_json::json!(0), serde_json::json!(-3000.5)] {
            let body = serde_json::json!({ "ethereum": { "usd": 3000, "eur": rate } });
            assert!(matches!(
                parse_simple_price(&body, "ethereum"),
                Err(PriceFeedError::Malformed(_))
            ));
        }
    }
}
