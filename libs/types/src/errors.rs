//! Validation errors for configs and signals

use thiserror::Error;

/// Errors raised when a value violates a data-model invariant
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Strategy subscribes to nothing
    #[error("strategy {strategy_id} has no subscribed symbols")]
    NoSymbols { strategy_id: String },

    /// Strategy identity is blank
    #[error("strategy id cannot be empty")]
    EmptyStrategyId,

    /// A transport coordinate is blank
    #[error("strategy {strategy_id}: transport field '{field}' cannot be empty")]
    EmptyTransport {
        strategy_id: String,
        field: &'static str,
    },

    /// Signal targets a symbol outside the subscribed set
    #[error("signal symbol {symbol} is not subscribed by strategy {strategy_id}")]
    UnsubscribedSymbol { strategy_id: String, symbol: String },

    /// Confidence outside [0.0, 1.0] or NaN
    #[error("signal confidence {value} outside [0.0, 1.0]")]
    ConfidenceOutOfRange { value: f64 },

    /// Quantity below zero
    #[error("signal quantity {value} is negative")]
    NegativeQuantity { value: String },
}
