//! Strategy identity and configuration

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Operator-assigned strategy identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(String);

impl StrategyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StrategyId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A single strategy parameter value.
///
/// Untagged so TOML/JSON literals map directly: `fast_period = 5`,
/// `policy = "fatal"`, `enabled = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "float",
            ParamValue::Text(_) => "string",
        }
    }

    /// Numeric view; integers widen to float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Strategy-specific settings, interpreted once by the strategy variant at
/// worker start.
pub type ParameterBag = BTreeMap<String, ParamValue>;

/// Where a strategy reads ticks from and publishes signals to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportBinding {
    /// Name of the tick stream to consume
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Consumer group holding this strategy's committed offset
    pub consumer_group: String,
    /// Signal channel the strategy publishes to
    #[serde(default = "default_signal_channel")]
    pub signal_channel: String,
}

fn default_stream() -> String {
    "market_ticks".to_string()
}

fn default_signal_channel() -> String {
    "signals".to_string()
}

impl TransportBinding {
    /// Default stream and channel with a group named after the strategy
    pub fn for_strategy(id: &StrategyId) -> Self {
        Self {
            stream: default_stream(),
            consumer_group: format!("strategy-{}", id),
            signal_channel: default_signal_channel(),
        }
    }
}

/// Per-strategy configuration.
///
/// Immutable for the lifetime of a worker; changing it means restarting the
/// worker with a new config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: StrategyId,
    /// Name of the decision variant that interprets `params`
    pub strategy_type: String,
    pub symbols: BTreeSet<String>,
    #[serde(default)]
    pub params: ParameterBag,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub transport: TransportBinding,
}

fn default_enabled() -> bool {
    true
}

impl StrategyConfig {
    pub fn new<I, S>(id: impl Into<String>, strategy_type: impl Into<String>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = StrategyId::new(id);
        let transport = TransportBinding::for_strategy(&id);
        Self {
            id,
            strategy_type: strategy_type.into(),
            symbols: symbols.into_iter().map(Into::into).collect(),
            params: ParameterBag::new(),
            enabled: true,
            transport,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_transport(mut self, transport: TransportBinding) -> Self {
        self.transport = transport;
        self
    }

    pub fn subscribes_to(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Structural checks that do not depend on the strategy variant
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyStrategyId);
        }
        if self.symbols.is_empty() || self.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(ValidationError::NoSymbols {
                strategy_id: self.id.to_string(),
            });
        }
        for (field, value) in [
            ("stream", &self.transport.stream),
            ("consumer_group", &self.transport.consumer_group),
            ("signal_channel", &self.transport.signal_channel),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyTransport {
                    strategy_id: self.id.to_string(),
                    field,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_symbols() {
        let config = StrategyConfig::new("s1", "momentum", Vec::<String>::new());
        assert_eq!(
            config.validate(),
            Err(ValidationError::NoSymbols {
                strategy_id: "s1".to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_blank_consumer_group() {
        let mut config = StrategyConfig::new("s1", "momentum", ["INFY"]);
        config.transport.consumer_group = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::EmptyTransport {
                field: "consumer_group",
                ..
            })
        ));
    }

    #[test]
    fn test_params_deserialize_untagged() {
        let json = r#"{
            "id": "s1",
            "strategy_type": "threshold",
            "symbols": ["INFY", "TCS"],
            "params": {"buy_threshold": 1.5, "cooldown_ticks": 3, "policy": "fatal", "dry": true},
            "transport": {"consumer_group": "g1"}
        }"#;
        let config: StrategyConfig = serde_json::from_str(json).unwrap();

        assert!(config.enabled);
        assert_eq!(config.transport.stream, "market_ticks");
        assert_eq!(config.params["buy_threshold"], ParamValue::Float(1.5));
        assert_eq!(config.params["cooldown_ticks"], ParamValue::Int(3));
        assert_eq!(config.params["policy"].as_str(), Some("fatal"));
        assert_eq!(config.params["dry"].as_bool(), Some(true));
        assert!(config.validate().is_ok());
    }
}
