//! # Torq Strategy Engine
//!
//! Runs many trading strategies concurrently against a shared market-data
//! stream and publishes their signals.
//!
//! ```text
//! feed ─► TickSourceAdapter ─► tick stream ─┬─► StrategyWorker (group A) ─┐
//!                                           ├─► StrategyWorker (group B) ─┼─► SignalBus ─► subscribers
//!                                           └─► ...                       ┘
//!                     EngineSupervisor: start / restart / park / drain
//!                     StatsRegistry:    per-strategy counters and health
//! ```
//!
//! Every worker reads through its own consumer group, so a slow strategy
//! never holds back another one. All workers draw from one shared order-rate
//! budget, and runtime admissions are refused while the process is above its
//! memory ceiling.
//!
//! State is explicit: build an [`EngineContext`], hand it to an
//! [`EngineSupervisor`] and start it with the strategy configs.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use torq_engine_config::EngineSettings;
//! use torq_strategy_engine::{EngineContext, EngineSupervisor};
//! use torq_types::StrategyConfig;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let ctx = Arc::new(EngineContext::new(EngineSettings::default()));
//! let supervisor = EngineSupervisor::new(ctx.clone());
//! supervisor.start(&[StrategyConfig::new("momentum-1", "momentum", ["INFY"])])?;
//!
//! let signals = ctx.signals().subscribe("signals", "printer");
//! while let Some(envelope) = signals.recv().await {
//!     println!("{}", envelope.to_json()?);
//! }
//! supervisor.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod feed;
pub mod health;
pub mod logging;
pub mod memory;
pub mod rate_limit;
pub mod registry;
pub mod shutdown;
pub mod supervisor;
pub mod vault;
pub mod worker;

pub use context::EngineContext;
pub use error::{EngineError, WorkerExit, WorkerFault};
pub use feed::{FeedSummary, ReplayFeed, ReplaySource, SyntheticFeed};
pub use memory::{AdmissionGate, FixedMemoryProbe, MemoryProbe, ProcessMemoryProbe};
pub use rate_limit::{OrderRateLimiter, RateDecision, RateLimitStats};
pub use registry::{RegistryTotals, StatsRegistry};
pub use shutdown::ShutdownToken;
pub use supervisor::{EngineHealth, EngineSupervisor};
pub use vault::{Ciphertext, CredentialVault, Plaintext, VaultError};
pub use worker::StrategyWorker;
