//! # Torq Strategy Engine Configuration
//!
//! Engine-wide budgets (strategy slots, order rate, memory ceiling, intervals,
//! restart policy) and the list of per-strategy configs, loaded from TOML with
//! `TORQ_ENGINE__*` environment overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use torq_engine_config::{resolve_config_path, EngineConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let path = resolve_config_path(None)?;
//! let config = EngineConfig::load(Some(&path))?;
//! println!("{} strategies enabled", config.enabled_strategies().count());
//! # Ok(())
//! # }
//! ```

pub mod defaults;
pub mod engine_config;

pub use engine_config::{
    resolve_config_path, EngineConfig, EngineSettings, FeedSettings, HealthSettings,
    LoggingConfig, RestartPolicy, CONFIG_PATH_ENV,
};
