//! Strategy variant registry

use crate::decision::Decision;
use crate::error::ParamError;
use crate::{momentum, threshold};
use std::collections::BTreeMap;
use torq_types::{ParameterBag, StrategyConfig};
use tracing::debug;

/// Builds a decision from a resolved parameter bag
pub type DecisionBuilder = fn(&ParameterBag) -> Result<Box<dyn Decision>, ParamError>;

/// Maps `strategy_type` names to builders
#[derive(Clone)]
pub struct StrategyFactory {
    builders: BTreeMap<String, DecisionBuilder>,
}

impl StrategyFactory {
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Factory with the `momentum` and `threshold` variants registered
    pub fn with_builtin() -> Self {
        let mut factory = Self::empty();
        factory.register(momentum::STRATEGY_TYPE, |bag| {
            Ok(Box::new(momentum::MomentumCrossover::from_params(bag)?))
        });
        factory.register(threshold::STRATEGY_TYPE, |bag| {
            Ok(Box::new(threshold::ChangeBreakout::from_params(bag)?))
        });
        factory
    }

    pub fn register(&mut self, strategy_type: &str, builder: DecisionBuilder) {
        self.builders.insert(strategy_type.to_string(), builder);
    }

    pub fn known_types(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    /// Resolve the config's parameter bag into a ready decision
    pub fn build(&self, config: &StrategyConfig) -> Result<Box<dyn Decision>, ParamError> {
        let builder =
            self.builders
                .get(&config.strategy_type)
                .ok_or_else(|| ParamError::UnknownStrategyType {
                    name: config.strategy_type.clone(),
                })?;
        let decision = builder(&config.params)?;
        debug!(
            strategy_id = %config.id,
            strategy_type = %config.strategy_type,
            "Resolved strategy parameters"
        );
        Ok(decision)
    }
}

impl Default for StrategyFactory {
    fn default() -> Self {
        Self::with_builtin()
    }
}
