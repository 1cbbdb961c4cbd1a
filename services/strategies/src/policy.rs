//! Handling of ticks with an unusable last price

use crate::error::{DecisionError, ParamError};
use crate::params::ParamReader;
use torq_types::MarketTick;

/// What a strategy does with a non-positive last price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidPricePolicy {
    /// Count the tick as an error and keep running
    #[default]
    Skip,
    /// Treat it as a broken feed and fault the worker
    Fatal,
}

impl InvalidPricePolicy {
    pub const PARAM: &'static str = "invalid_price_policy";

    pub fn from_params(reader: &mut ParamReader<'_>) -> Result<Self, ParamError> {
        Ok(match reader.choice(Self::PARAM, &["skip", "fatal"], "skip")? {
            "fatal" => InvalidPricePolicy::Fatal,
            _ => InvalidPricePolicy::Skip,
        })
    }

    pub fn check(self, tick: &MarketTick) -> Result<(), DecisionError> {
        if tick.last_price.is_sign_positive() && !tick.last_price.is_zero() {
            return Ok(());
        }
        let message = format!(
            "invalid last price {} for {} at {}",
            tick.last_price, tick.symbol, tick.exchange_timestamp_ns
        );
        match self {
            InvalidPricePolicy::Skip => Err(DecisionError::recoverable(message)),
            InvalidPricePolicy::Fatal => Err(DecisionError::fatal(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_negative_price_severity_follows_policy() {
        let tick = MarketTick::new("INFY", dec!(-5), 1);
        assert!(!InvalidPricePolicy::Skip.check(&tick).unwrap_err().is_fatal());
        assert!(InvalidPricePolicy::Fatal.check(&tick).unwrap_err().is_fatal());
    }

    #[test]
    fn test_zero_price_is_invalid() {
        let tick = MarketTick::new("INFY", dec!(0), 1);
        assert!(InvalidPricePolicy::Skip.check(&tick).is_err());
        assert!(InvalidPricePolicy::Skip
            .check(&MarketTick::new("INFY", dec!(0.05), 1))
            .is_ok());
    }
}
