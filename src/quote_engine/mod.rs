pub mod engine;
pub mod price_cache;
pub mod price_source;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::QuoteError;

pub use engine::{QuoteConfig, QuoteEstimator};
pub use price_cache::{PriceCacheConfig, PriceFeedCache};
pub use price_source::{CoinGeckoSource, PriceSource};

/// Decimal places for native-asset amounts
pub const NATIVE_DP: u32 = 12;
/// Decimal places for fiat amounts
pub const FIAT_DP: u32 = 6;

pub fn round_native(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(NATIVE_DP, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_fiat(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(FIAT_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Arithmetic on `amount` left the representable Decimal range
pub(crate) fn out_of_range(amount: Decimal) -> QuoteError {
    QuoteError::InvalidAmount(format!("{} is too large to price", amount))
}
