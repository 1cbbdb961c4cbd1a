//! Error types for strategy decisions and parameter resolution

use crate::indicators::Overflow;
use thiserror::Error;

/// Per-tick decision failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionError {
    /// Bad input for one tick; the worker counts it and moves on
    #[error("{message}")]
    Recoverable { message: String },

    /// The strategy cannot continue; the worker faults
    #[error("fatal: {message}")]
    Fatal { message: String },
}

impl DecisionError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        DecisionError::Recoverable {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        DecisionError::Fatal {
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, DecisionError::Fatal { .. })
    }
}

/// Arithmetic overflow depends on the tick, not on the strategy
impl From<Overflow> for DecisionError {
    fn from(overflow: Overflow) -> Self {
        DecisionError::recoverable(overflow.to_string())
    }
}

/// Parameter bag does not fit the strategy variant
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("unknown strategy type '{name}'")]
    UnknownStrategyType { name: String },

    #[error("parameter '{name}' is required")]
    Missing { name: String },

    #[error("parameter '{name}' expected {expected}, found {found}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("parameter '{name}' invalid: {reason}")]
    Invalid { name: String, reason: String },

    #[error("unknown parameter(s) for {strategy_type}: {names}")]
    Unknown {
        strategy_type: &'static str,
        names: String,
    },
}
