//! Trading signals emitted by strategy workers

use crate::errors::ValidationError;
use crate::strategy::StrategyId;
use crate::time::now_ns;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Direction of a trading decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// A single strategy decision, created once and never mutated afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub strategy_id: StrategyId,
    pub symbol: String,
    pub action: SignalAction,
    /// Confidence in `[0.0, 1.0]`
    pub confidence: f64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub generated_at_ns: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TradingSignal {
    pub fn new(
        strategy_id: StrategyId,
        symbol: impl Into<String>,
        action: SignalAction,
        confidence: f64,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            strategy_id,
            symbol: symbol.into(),
            action,
            confidence,
            price,
            quantity,
            generated_at_ns: now_ns(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Checks that hold regardless of which strategy emitted the signal
    pub fn validate_values(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::ConfidenceOutOfRange {
                value: self.confidence,
            });
        }
        if self.quantity.is_sign_negative() && !self.quantity.is_zero() {
            return Err(ValidationError::NegativeQuantity {
                value: self.quantity.to_string(),
            });
        }
        Ok(())
    }

    /// Full emission check against the originating strategy's symbols
    pub fn validate_for(&self, subscribed: &BTreeSet<String>) -> Result<(), ValidationError> {
        if !subscribed.contains(&self.symbol) {
            return Err(ValidationError::UnsubscribedSymbol {
                strategy_id: self.strategy_id.to_string(),
                symbol: self.symbol.clone(),
            });
        }
        self.validate_values()
    }
}

/// What subscribers receive: the signal plus its per-strategy sequence
#[derive(Debug, Clone, Serialize)]
pub struct SignalEnvelope {
    pub channel: String,
    /// Starts at 1 and increases by one per signal of the same strategy
    pub sequence: u64,
    pub published_at_ns: u64,
    pub signal: Arc<TradingSignal>,
}

impl SignalEnvelope {
    pub fn strategy_id(&self) -> &StrategyId {
        &self.signal.strategy_id
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
