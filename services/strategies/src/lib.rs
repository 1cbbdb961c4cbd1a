//! # Torq Strategies
//!
//! Decision logic behind strategy workers. Each strategy variant resolves
//! its parameter bag once, at worker start, into a typed value and then
//! turns ticks into at most one [`SignalDraft`] each.
//!
//! Built-in variants:
//! - `momentum`: fast/slow moving-average crossover gated by rate of change
//! - `threshold`: percent-change breakout with per-symbol cooldown
//!
//! ```rust
//! use torq_strategies::StrategyFactory;
//! use torq_types::{ParamValue, StrategyConfig};
//!
//! let config = StrategyConfig::new("m1", "momentum", ["INFY"])
//!     .with_param("fast_period", ParamValue::Int(3))
//!     .with_param("slow_period", ParamValue::Int(8));
//! let decision = StrategyFactory::with_builtin().build(&config).unwrap();
//! assert_eq!(decision.name(), "momentum");
//! ```

pub mod decision;
pub mod error;
pub mod factory;
pub mod indicators;
pub mod momentum;
pub mod params;
pub mod policy;
pub mod threshold;

pub use decision::{Decision, SignalDraft};
pub use error::{DecisionError, ParamError};
pub use factory::StrategyFactory;
pub use momentum::MomentumCrossover;
pub use policy::InvalidPricePolicy;
pub use threshold::ChangeBreakout;
