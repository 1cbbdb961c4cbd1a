//! Moving-average crossover strategy
//!
//! Emits BUY when the fast mean crosses above the slow mean with a rate of
//! change at or above `min_roc_pct`, SELL on the mirror image. Confidence
//! grows linearly from 0.5 to 1.0 as |rate of change| approaches
//! `strong_roc_pct`.

use crate::decision::{Decision, SignalDraft};
use crate::error::{DecisionError, ParamError};
use crate::indicators::{Cross, CrossDetector, RateOfChange, RollingMean};
use crate::params::ParamReader;
use crate::policy::InvalidPricePolicy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use torq_types::{MarketTick, ParameterBag, SignalAction};

pub const STRATEGY_TYPE: &str = "momentum";

/// Resolved parameters
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub roc_period: usize,
    pub min_roc_pct: Decimal,
    pub strong_roc_pct: Decimal,
    pub quantity: Decimal,
    pub cooldown_ticks: u64,
    pub invalid_price_policy: InvalidPricePolicy,
}

impl MomentumParams {
    pub fn from_params(bag: &ParameterBag) -> Result<Self, ParamError> {
        let mut reader = ParamReader::new(STRATEGY_TYPE, bag);
        let params = Self {
            fast_period: reader.period("fast_period", 5)?,
            slow_period: reader.period("slow_period", 20)?,
            roc_period: reader.period("roc_period", 10)?,
            min_roc_pct: reader.decimal("min_roc_pct", dec!(0))?,
            strong_roc_pct: reader.decimal("strong_roc_pct", dec!(2))?,
            quantity: reader.decimal("quantity", dec!(1))?,
            cooldown_ticks: reader.count("cooldown_ticks", 0)?,
            invalid_price_policy: InvalidPricePolicy::from_params(&mut reader)?,
        };
        reader.finish()?;

        if params.fast_period >= params.slow_period {
            return Err(ParamError::Invalid {
                name: "fast_period".to_string(),
                reason: format!(
                    "must be shorter than slow_period ({} >= {})",
                    params.fast_period, params.slow_period
                ),
            });
        }
        if params.min_roc_pct.is_sign_negative() && !params.min_roc_pct.is_zero() {
            return Err(ParamError::Invalid {
                name: "min_roc_pct".to_string(),
                reason: "must be >= 0".to_string(),
            });
        }
        if params.strong_roc_pct <= Decimal::ZERO {
            return Err(ParamError::Invalid {
                name: "strong_roc_pct".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if params.quantity < Decimal::ZERO {
            return Err(ParamError::Invalid {
                name: "quantity".to_string(),
                reason: "must be >= 0".to_string(),
            });
        }
        Ok(params)
    }
}

struct SymbolState {
    fast: RollingMean,
    slow: RollingMean,
    roc: RateOfChange,
    cross: CrossDetector,
    cooldown: u64,
}

pub struct MomentumCrossover {
    params: MomentumParams,
    symbols: HashMap<String, SymbolState>,
}

impl MomentumCrossover {
    pub fn new(params: MomentumParams) -> Self {
        Self {
            params,
            symbols: HashMap::new(),
        }
    }

    pub fn from_params(bag: &ParameterBag) -> Result<Self, ParamError> {
        MomentumParams::from_params(bag).map(Self::new)
    }

    pub fn params(&self) -> &MomentumParams {
        &self.params
    }

    fn confidence(&self, roc: Decimal) -> f64 {
        let strength = roc
            .abs()
            .checked_div(self.params.strong_roc_pct)
            .unwrap_or(Decimal::ONE)
            .min(Decimal::ONE)
            .to_f64()
            .unwrap_or(0.0);
        (0.5 + 0.5 * strength).clamp(0.0, 1.0)
    }
}

impl Decision for MomentumCrossover {
    fn name(&self) -> &'static str {
        STRATEGY_TYPE
    }

    fn on_tick(&mut self, tick: &MarketTick) -> Result<Option<SignalDraft>, DecisionError> {
        self.params.invalid_price_policy.check(tick)?;

        let params = &self.params;
        let state = self
            .symbols
            .entry(tick.symbol.clone())
            .or_insert_with(|| SymbolState {
                fast: RollingMean::new(params.fast_period),
                slow: RollingMean::new(params.slow_period),
                roc: RateOfChange::new(params.roc_period),
                cross: CrossDetector::default(),
                cooldown: 0,
            });

        let price = tick.last_price;
        let fast = state.fast.push(price)?;
        let slow = state.slow.push(price)?;
        let roc = state.roc.push(price)?.unwrap_or(Decimal::ZERO);

        let cooling = state.cooldown > 0;
        if cooling {
            state.cooldown -= 1;
        }

        let (Some(fast), Some(slow)) = (fast, slow) else {
            return Ok(None);
        };
        let Some(cross) = state.cross.update(fast, slow) else {
            return Ok(None);
        };
        if cooling {
            return Ok(None);
        }

        let action = match cross {
            Cross::Above if roc >= params.min_roc_pct => SignalAction::Buy,
            Cross::Below if roc <= -params.min_roc_pct => SignalAction::Sell,
            _ => return Ok(None),
        };
        state.cooldown = params.cooldown_ticks;
        let quantity = params.quantity;

        let draft = SignalDraft::new(
            tick.symbol.clone(),
            action,
            self.confidence(roc),
            price,
            quantity,
        )
        .with_metadata("fast_ma", serde_json::Value::String(fast.round_dp(4).to_string()))
        .with_metadata("slow_ma", serde_json::Value::String(slow.round_dp(4).to_string()))
        .with_metadata("roc_pct", serde_json::Value::String(roc.round_dp(4).to_string()));

        Ok(Some(draft))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torq_types::ParamValue;

    fn strategy(extra: &[(&str, ParamValue)]) -> MomentumCrossover {
        let mut bag = ParameterBag::new();
        bag.insert("fast_period".into(), ParamValue::Int(2));
        bag.insert("slow_period".into(), ParamValue::Int(4));
        bag.insert("roc_period".into(), ParamValue::Int(2));
        for (k, v) in extra {
            bag.insert(k.to_string(), v.clone());
        }
        MomentumCrossover::from_params(&bag).unwrap()
    }

    fn feed(strategy: &mut MomentumCrossover, prices: &[i64]) -> Vec<Option<SignalDraft>> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let tick = MarketTick::new("INFY", Decimal::from(*p), i as u64 + 1);
                strategy.on_tick(&tick).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_bullish_cross_emits_buy() {
        let mut strategy = strategy(&[]);
        let drafts = feed(&mut strategy, &[100, 99, 98, 97, 105]);

        assert!(drafts[..4].iter().all(Option::is_none));
        let buy = drafts[4].as_ref().unwrap();
        assert_eq!(buy.action, SignalAction::Buy);
        assert_eq!(buy.confidence, 1.0);
        assert_eq!(buy.quantity, dec!(1));
    }

    #[test]
    fn test_bearish_cross_emits_sell() {
        let mut strategy = strategy(&[]);
        let drafts = feed(&mut strategy, &[100, 101, 102, 103, 95]);
        assert_eq!(drafts[4].as_ref().unwrap().action, SignalAction::Sell);
    }

    #[test]
    fn test_weak_cross_filtered_by_min_roc() {
        let mut strategy = strategy(&[("min_roc_pct", ParamValue::Float(50.0))]);
        let drafts = feed(&mut strategy, &[100, 99, 98, 97, 105]);
        assert!(drafts.iter().all(Option::is_none));
    }

    #[test]
    fn test_cooldown_suppresses_next_cross() {
        let mut strategy = strategy(&[("cooldown_ticks", ParamValue::Int(10))]);
        let drafts = feed(&mut strategy, &[100, 99, 98, 97, 105, 80, 120]);
        let emitted = drafts.iter().filter(|d| d.is_some()).count();
        assert_eq!(emitted, 1);
    }

    #[test]
    fn test_symbols_tracked_independently() {
        let mut strategy = strategy(&[]);
        for (i, p) in [100, 99, 98].iter().enumerate() {
            strategy
                .on_tick(&MarketTick::new("INFY", Decimal::from(*p), i as u64 + 1))
                .unwrap();
        }
        // a different symbol cannot complete INFY's window
        let other = strategy
            .on_tick(&MarketTick::new("TCS", dec!(500), 10))
            .unwrap();
        assert!(other.is_none());
        assert_eq!(strategy.symbols.len(), 2);
    }

    #[test]
    fn test_negative_price_policy() {
        let mut skip = strategy(&[]);
        let err = skip
            .on_tick(&MarketTick::new("INFY", dec!(-5), 1))
            .unwrap_err();
        assert!(!err.is_fatal());

        let mut fatal = strategy(&[(
            "invalid_price_policy",
            ParamValue::Text("fatal".into()),
        )]);
        let err = fatal
            .on_tick(&MarketTick::new("INFY", dec!(-5), 1))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_price_beyond_window_range_is_recoverable() {
        let mut strategy = strategy(&[]);
        strategy
            .on_tick(&MarketTick::new("INFY", Decimal::MAX, 1))
            .unwrap();
        let err = strategy
            .on_tick(&MarketTick::new("INFY", Decimal::MAX, 2))
            .unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "rolling sum overflowed the decimal range");
    }

    #[test]
    fn test_rejects_inverted_periods() {
        let mut bag = ParameterBag::new();
        bag.insert("fast_period".into(), ParamValue::Int(10));
        bag.insert("slow_period".into(), ParamValue::Int(5));
        assert!(matches!(
            MomentumCrossover::from_params(&bag),
            Err(ParamError::Invalid { .. })
        ));
    }
}
