//! Decision capability implemented by every strategy variant

use crate::error::DecisionError;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use torq_types::{MarketTick, SignalAction, StrategyId, TradingSignal};

/// Strategy-specific tick interpretation.
///
/// Implementations own all of their per-symbol state; the worker calls
/// `on_tick` only for subscribed symbols, one tick at a time.
pub trait Decision: Send {
    /// Variant name, e.g. `"momentum"`
    fn name(&self) -> &'static str;

    /// Advance on one tick and optionally propose a signal
    fn on_tick(&mut self, tick: &MarketTick) -> Result<Option<SignalDraft>, DecisionError>;
}

/// A proposed signal before it is bound to a strategy id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDraft {
    pub symbol: String,
    pub action: SignalAction,
    pub confidence: f64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SignalDraft {
    pub fn new(
        symbol: impl Into<String>,
        action: SignalAction,
        confidence: f64,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            action,
            confidence,
            price,
            quantity,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn into_signal(self, strategy_id: StrategyId) -> TradingSignal {
        let mut signal = TradingSignal::new(
            strategy_id,
            self.symbol,
            self.action,
            self.confidence,
            self.price,
            self.quantity,
        );
        signal.metadata = self.metadata;
        signal
    }
}
