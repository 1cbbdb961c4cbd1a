//! # Tick Stream - Market Data Distribution
//!
//! ## Purpose
//! Normalizes external market-data events into [`MarketTick`] records and
//! appends them to an ordered, multi-consumer log that every strategy worker
//! reads independently through its own consumer group.
//!
//! ## Architecture Role
//! ```text
//! Feed → [TickSourceAdapter] → [TickLog] → GroupConsumer (strategy A)
//!                                   ├────→ GroupConsumer (strategy B)
//!                                   └────→ GroupConsumer (strategy N)
//! ```
//!
//! ## Ordering
//! - Every accepted tick gets a globally increasing [`SequenceId`], including
//!   ticks that share `(symbol, exchange_timestamp)`
//! - Ticks of one symbol are accepted in non-decreasing exchange-timestamp
//!   order; older ticks are refused with [`IngestError::OutOfOrder`]
//! - No ordering is promised across symbols
//!
//! ## Retention
//! Each consumer group owns a committed offset. Entries every group has
//! committed past are trimmed. When the log is full and nothing can be
//! trimmed, ingest fails with [`IngestError::Backpressure`] and the caller
//! retries with backoff. With no consumer groups attached the oldest entry is
//! evicted instead.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use rust_decimal::Decimal;
//! use torq_tick_stream::{TickLog, TickSourceAdapter};
//! use torq_types::MarketTick;
//!
//! # tokio_test::block_on(async {
//! let log = Arc::new(TickLog::new("market_ticks", 1_000));
//! let adapter = TickSourceAdapter::new(Arc::clone(&log));
//! let mut consumer = log.consumer("strategy-a");
//!
//! adapter.publish(MarketTick::new("INFY", Decimal::from(1500), 1)).unwrap();
//! let tick = consumer.next().await.unwrap();
//! assert_eq!(tick.tick.symbol, "INFY");
//! consumer.commit();
//! # });
//! ```
//!
//! [`MarketTick`]: torq_types::MarketTick
//! [`SequenceId`]: torq_types::SequenceId

pub mod adapter;
pub mod error;
pub mod hub;
pub mod log;

pub use adapter::{IngestMetrics, IngestStats, RawTickEvent, TickSourceAdapter};
pub use error::IngestError;
pub use hub::StreamHub;
pub use log::{GroupConsumer, TickLog};
