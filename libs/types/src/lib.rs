//! # Torq Strategy Engine Types
//!
//! Canonical data model shared by every stage of the signal pipeline:
//!
//! - [`MarketTick`]: normalized market-data event, immutable once created and
//!   shared read-only between strategy workers
//! - [`StrategyConfig`]: per-strategy identity, subscribed symbols, parameter
//!   bag and transport coordinates
//! - [`TradingSignal`]: a single BUY/SELL/HOLD decision emitted by a worker
//! - [`StrategyStats`]: point-in-time view of a strategy's counters and health
//!
//! ## Invariants
//!
//! Construction-time validation lives next to each type. A signal is only
//! publishable when its symbol belongs to the originating strategy's
//! subscribed set, its confidence lies in `[0.0, 1.0]` and its quantity is
//! non-negative. Violations are rejected, never clamped.
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use rust_decimal::Decimal;
//! use torq_types::{SignalAction, StrategyId, TradingSignal};
//!
//! let symbols: BTreeSet<String> = ["INFY".to_string()].into_iter().collect();
//! let signal = TradingSignal::new(
//!     StrategyId::new("momentum-1"),
//!     "INFY",
//!     SignalAction::Buy,
//!     0.8,
//!     Decimal::new(150025, 2),
//!     Decimal::from(10),
//! );
//! assert!(signal.validate_for(&symbols).is_ok());
//! ```

pub mod errors;
pub mod signal;
pub mod stats;
pub mod strategy;
pub mod tick;
pub mod time;

pub use errors::ValidationError;
pub use signal::{SignalAction, SignalEnvelope, TradingSignal};
pub use stats::{ErrorDetail, StrategyStats, WorkerState};
pub use strategy::{ParamValue, ParameterBag, StrategyConfig, StrategyId, TransportBinding};
pub use tick::{MarketTick, SequenceId, SequencedTick};
