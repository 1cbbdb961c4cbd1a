//! Percent-change breakout strategy
//!
//! Uses the feed's percent change when present, otherwise the change versus
//! the first price seen for the symbol. A signal fires when the change enters
//! the buy or sell zone; staying inside the zone does not re-fire.

use crate::decision::{Decision, SignalDraft};
use crate::error::{DecisionError, ParamError};
use crate::params::ParamReader;
use crate::policy::InvalidPricePolicy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use torq_types::{MarketTick, ParameterBag, SignalAction};

pub const STRATEGY_TYPE: &str = "threshold";

#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutParams {
    pub buy_above_pct: Decimal,
    pub sell_below_pct: Decimal,
    pub quantity: Decimal,
    pub cooldown_ticks: u64,
    pub invalid_price_policy: InvalidPricePolicy,
}

impl BreakoutParams {
    pub fn from_params(bag: &ParameterBag) -> Result<Self, ParamError> {
        let mut reader = ParamReader::new(STRATEGY_TYPE, bag);
        let params = Self {
            buy_above_pct: reader.decimal("buy_above_pct", dec!(1))?,
            sell_below_pct: reader.decimal("sell_below_pct", dec!(-1))?,
            quantity: reader.decimal("quantity", dec!(1))?,
            cooldown_ticks: reader.count("cooldown_ticks", 0)?,
            invalid_price_policy: InvalidPricePolicy::from_params(&mut reader)?,
        };
        reader.finish()?;

        if params.sell_below_pct >= params.buy_above_pct {
            return Err(ParamError::Invalid {
                name: "sell_below_pct".to_string(),
                reason: format!(
                    "must be below buy_above_pct ({} >= {})",
                    params.sell_below_pct, params.buy_above_pct
                ),
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

#[derive(Default)]
struct BreakoutState {
    reference: Option<Decimal>,
    zone: Option<SignalAction>,
    cooldown: u64,
}

pub struct ChangeBreakout {
    params: BreakoutParams,
    symbols: HashMap<String, BreakoutState>,
}

impl ChangeBreakout {
    pub fn new(params: BreakoutParams) -> Self {
        Self {
            params,
            symbols: HashMap::new(),
        }
    }

    pub fn from_params(bag: &ParameterBag) -> Result<Self, ParamError> {
        BreakoutParams::from_params(bag).map(Self::new)
    }

    /// 0.5 at the threshold, rising to 1.0 once the overshoot equals the
    /// threshold's own magnitude
    fn confidence(change: Decimal, threshold: Decimal) -> f64 {
        if threshold.is_zero() {
            return 1.0;
        }
        // past the decimal range counts as full overshoot
        let overshoot = change
            .checked_sub(threshold)
            .and_then(|excess| excess.abs().checked_div(threshold.abs()))
            .unwrap_or(Decimal::ONE)
            .min(Decimal::ONE)
            .to_f64()
            .unwrap_or(0.0);
        (0.5 + 0.5 * overshoot).clamp(0.0, 1.0)
    }
}

impl Decision for ChangeBreakout {
    fn name(&self) -> &'static str {
        STRATEGY_TYPE
    }

    fn on_tick(&mut self, tick: &MarketTick) -> Result<Option<SignalDraft>, DecisionError> {
        self.params.invalid_price_policy.check(tick)?;

        let params = &self.params;
        let state = self.symbols.entry(tick.symbol.clone()).or_default();
        let reference = *state.reference.get_or_insert(tick.last_price);

        let change = match tick.change_pct {
            Some(change) => change,
            None => tick
                .last_price
                .checked_sub(reference)
                .and_then(|delta| delta.checked_div(reference))
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .ok_or_else(|| {
                    DecisionError::recoverable(format!(
                        "change of {} from reference {} overflowed the decimal range",
                        tick.last_price, reference
                    ))
                })?,
        };

        let cooling = state.cooldown > 0;
        if cooling {
            state.cooldown -= 1;
        }

        let (action, threshold) = if change >= params.buy_above_pct {
            (SignalAction::Buy, params.buy_above_pct)
        } else if change <= params.sell_below_pct {
            (SignalAction::Sell, params.sell_below_pct)
        } else {
            state.zone = None;
            return Ok(None);
        };

        if state.zone == Some(action) || cooling {
            return Ok(None);
        }
        state.zone = Some(action);
        state.cooldown = params.cooldown_ticks;

        let draft = SignalDraft::new(
            tick.symbol.clone(),
            action,
            Self::confidence(change, threshold),
            tick.last_price,
            params.quantity,
        )
        .with_metadata("change_pct", serde_json::Value::String(change.round_dp(4).to_string()));
        Ok(Some(draft))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torq_types::ParamValue;

    fn tick(price: Decimal, change: Option<Decimal>, ts: u64) -> MarketTick {
        let mut tick = MarketTick::new("TCS", price, ts);
        tick.change_pct = change;
        tick
    }

    #[test]
    fn test_fires_once_per_zone_entry() {
        let mut strategy = ChangeBreakout::from_params(&ParameterBag::new()).unwrap();

        assert!(strategy.on_tick(&tick(dec!(100), Some(dec!(0.5)), 1)).unwrap().is_none());
        let buy = strategy
            .on_tick(&tick(dec!(101), Some(dec!(1.5)), 2))
            .unwrap()
            .unwrap();
        assert_eq!(buy.action, SignalAction::Buy);
        assert_eq!(buy.confidence, 0.75);

        // still above threshold: no repeat
        assert!(strategy.on_tick(&tick(dec!(102), Some(dec!(2.0)), 3)).unwrap().is_none());
        // leave and re-enter
        assert!(strategy.on_tick(&tick(dec!(100), Some(dec!(0.0)), 4)).unwrap().is_none());
        assert!(strategy.on_tick(&tick(dec!(101), Some(dec!(1.2)), 5)).unwrap().is_some());
    }

    #[test]
    fn test_change_derived_from_reference_price() {
        let mut strategy = ChangeBreakout::from_params(&ParameterBag::new()).unwrap();
        assert!(strategy.on_tick(&tick(dec!(200), None, 1)).unwrap().is_none());
        let sell = strategy.on_tick(&tick(dec!(196), None, 2)).unwrap().unwrap();
        assert_eq!(sell.action, SignalAction::Sell);
        assert_eq!(sell.confidence, 1.0);
    }

    #[test]
    fn test_cooldown_blocks_opposite_zone() {
        let mut bag = ParameterBag::new();
        bag.insert("cooldown_ticks".into(), ParamValue::Int(5));
        let mut strategy = ChangeBreakout::from_params(&bag).unwrap();

        assert!(strategy.on_tick(&tick(dec!(1), Some(dec!(3)), 1)).unwrap().is_some());
        assert!(strategy.on_tick(&tick(dec!(1), Some(dec!(-3)), 2)).unwrap().is_none());
    }

    #[test]
    fn test_extreme_jump_from_tiny_reference_is_recoverable() {
        let mut strategy = ChangeBreakout::from_params(&ParameterBag::new()).unwrap();
        assert!(strategy.on_tick(&tick(Decimal::new(1, 28), None, 1)).unwrap().is_none());

        let err = strategy
            .on_tick(&tick(dec!(10000000000), None, 2))
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("overflowed"));

        // the strategy keeps working on the next tick
        assert!(strategy.on_tick(&tick(dec!(100), Some(dec!(5)), 3)).unwrap().is_some());
    }

    #[test]
    fn test_confidence_saturates_on_huge_change() {
        assert_eq!(ChangeBreakout::confidence(Decimal::MAX, dec!(-1)), 1.0);
    }

    #[test]
    fn test_rejects_overlapping_zones() {
        let mut bag = ParameterBag::new();
        bag.insert("buy_above_pct".into(), ParamValue::Float(-2.0));
        assert!(ChangeBreakout::from_params(&bag).is_err());
    }

    #[test]
    fn test_rejects_unknown_parameter() {
        let mut bag = ParameterBag::new();
        bag.insert("buy_above".into(), ParamValue::Float(2.0));
        assert!(matches!(
            ChangeBreakout::from_params(&bag),
            Err(ParamError::Unknown { .. })
        ));
    }
}
