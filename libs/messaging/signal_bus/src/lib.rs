//! # Signal Bus - Signal Distribution
//!
//! ## Purpose
//! Delivers every trading signal published on a channel to all current
//! subscribers of that channel, stamped with a per-strategy sequence number.
//!
//! ## Delivery Semantics
//! - **At-least-once** to every subscriber attached at publish time
//! - **Per-strategy order**: signals from one strategy reach any single
//!   subscriber in publish order; nothing is promised across strategies
//! - **Never blocks the publisher**: each subscriber has a bounded queue; when
//!   it is full the oldest undelivered signal for that subscriber is dropped
//!   and counted, and the drop is reported in the [`DeliveryReceipt`]
//!
//! ## Architecture Role
//! ```text
//! Strategy Workers → [SignalBus "signals"] → Subscription (execution)
//!                                   ├──────→ Subscription (dashboard)
//!                                   └──────→ Subscription (audit log)
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use rust_decimal::Decimal;
//! use torq_signal_bus::SignalBus;
//! use torq_types::{SignalAction, StrategyId, TradingSignal};
//!
//! let bus = Arc::new(SignalBus::new("signals", 64));
//! let subscription = bus.subscribe("execution");
//!
//! let signal = TradingSignal::new(
//!     StrategyId::new("momentum-1"), "INFY", SignalAction::Buy, 0.7,
//!     Decimal::from(1500), Decimal::from(5),
//! );
//! let receipt = bus.publish(signal).unwrap();
//! assert_eq!(receipt.sequence, 1);
//! assert_eq!(subscription.try_recv().unwrap().sequence, 1);
//! ```

pub mod bus;
pub mod error;
pub mod router;
pub mod subscription;

pub use bus::{BusStats, DeliveryReceipt, SignalBus, SignalSink};
pub use error::PublishError;
pub use router::SignalRouter;
pub use subscription::Subscription;
