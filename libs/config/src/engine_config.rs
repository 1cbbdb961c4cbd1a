//! Engine Configuration Module
//!
//! Loads engine settings and strategy definitions from a TOML file, with
//! environment variable overrides for the engine-wide budgets.

use crate::defaults;
use anyhow::{bail, ensure, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use torq_types::StrategyConfig;
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "TORQ_ENGINE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/engine.toml";

/// Complete engine configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub feed: FeedSettings,

    /// One entry per strategy, enabled or not
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

/// Engine-wide budgets and timeouts
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub max_strategies: usize,
    pub max_orders_per_second: u32,
    pub memory_limit_mb: u64,
    pub data_refresh_interval_ms: u64,
    pub execution_interval_ms: u64,
    pub shutdown_grace_ms: u64,
    pub publish_timeout_ms: u64,
    pub rate_limit_timeout_ms: u64,
    pub commit_interval: u64,
    pub health_window_secs: u64,
    pub tick_log_capacity: usize,
    pub subscriber_queue_capacity: usize,
    pub restart: RestartPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_strategies: defaults::engine::MAX_STRATEGIES,
            max_orders_per_second: defaults::engine::MAX_ORDERS_PER_SECOND,
            memory_limit_mb: defaults::engine::MEMORY_LIMIT_MB,
            data_refresh_interval_ms: defaults::engine::DATA_REFRESH_INTERVAL_MS,
            execution_interval_ms: defaults::engine::EXECUTION_INTERVAL_MS,
            shutdown_grace_ms: defaults::engine::SHUTDOWN_GRACE_MS,
            publish_timeout_ms: defaults::worker::PUBLISH_TIMEOUT_MS,
            rate_limit_timeout_ms: defaults::worker::RATE_LIMIT_TIMEOUT_MS,
            commit_interval: defaults::worker::COMMIT_INTERVAL,
            health_window_secs: defaults::engine::HEALTH_WINDOW_SECS,
            tick_log_capacity: defaults::transport::TICK_LOG_CAPACITY,
            subscriber_queue_capacity: defaults::transport::SUBSCRIBER_QUEUE_CAPACITY,
            restart: RestartPolicy::default(),
        }
    }
}

impl EngineSettings {
    pub fn data_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.data_refresh_interval_ms)
    }

    pub fn execution_interval(&self) -> Duration {
        Duration::from_millis(self.execution_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn rate_limit_timeout(&self) -> Duration {
        Duration::from_millis(self.rate_limit_timeout_ms)
    }

    pub fn health_window(&self) -> Duration {
        Duration::from_secs(self.health_window_secs)
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb.saturating_mul(1024 * 1024)
    }
}

/// Automatic restart of faulted workers
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RestartPolicy {
    pub enabled: bool,
    /// Restarts attempted before the strategy is parked
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            enabled: defaults::restart::ENABLED,
            max_attempts: defaults::restart::MAX_ATTEMPTS,
            base_backoff_ms: defaults::restart::BASE_BACKOFF_MS,
            max_backoff_ms: defaults::restart::MAX_BACKOFF_MS,
        }
    }
}

impl RestartPolicy {
    /// Backoff before restart number `attempt` (1-based): base * 2^(attempt-1),
    /// capped at `max_backoff_ms`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .base_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// Logging output
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Monitoring HTTP endpoint
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct HealthSettings {
    pub enabled: bool,
    pub port: u16,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: defaults::health::PORT,
        }
    }
}

/// Tick source for the engine binary
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct FeedSettings {
    /// JSON-lines file of raw feed events; `-` reads stdin
    pub replay_path: Option<String>,
    /// Generate random-walk ticks for `synthetic_symbols`
    pub synthetic: bool,
    pub synthetic_symbols: Vec<String>,
    /// Stream the feed publishes into
    pub stream: Option<String>,
}

impl EngineConfig {
    /// Load configuration from an optional TOML file plus process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            ensure!(path.exists(), "Config file not found: {}", path.display());
            info!("Loading engine config: {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(env_source(None))
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    /// Parse configuration from TOML text, with an explicit environment map
    /// in place of the process environment.
    pub fn from_toml_str(
        contents: &str,
        env: Option<config_crate::Map<String, String>>,
    ) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .add_source(env_source(Some(env.unwrap_or_default())))
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let mut parsed: EngineConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        parsed.expand_env_vars()?;
        parsed.validate()?;
        debug!(
            strategies = parsed.strategies.len(),
            max_strategies = parsed.engine.max_strategies,
            "Engine configuration loaded"
        );
        Ok(parsed)
    }

    /// Effective configuration as TOML, after environment overrides and
    /// path expansion
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Configs with `enabled = true`, in file order
    pub fn enabled_strategies(&self) -> impl Iterator<Item = &StrategyConfig> {
        self.strategies.iter().filter(|s| s.enabled)
    }

    /// Expand environment variables in path values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let Some(path) = &self.feed.replay_path {
            let expanded = shellexpand::full(path).context("Failed to expand replay path")?;
            self.feed.replay_path = Some(expanded.to_string());
        }
        Ok(())
    }

    /// Reject budgets and strategy lists the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        ensure!(engine.max_strategies > 0, "max_strategies must be positive");
        ensure!(
            engine.max_orders_per_second > 0,
            "max_orders_per_second must be positive"
        );
        ensure!(engine.memory_limit_mb > 0, "memory_limit_mb must be positive");
        ensure!(
            engine.execution_interval_ms > 0,
            "execution_interval_ms must be positive"
        );
        ensure!(
            engine.data_refresh_interval_ms > 0,
            "data_refresh_interval_ms must be positive"
        );
        ensure!(engine.commit_interval > 0, "commit_interval must be positive");
        ensure!(engine.tick_log_capacity > 0, "tick_log_capacity must be positive");
        ensure!(
            engine.subscriber_queue_capacity > 0,
            "subscriber_queue_capacity must be positive"
        );
        ensure!(
            engine.restart.max_backoff_ms >= engine.restart.base_backoff_ms,
            "restart.max_backoff_ms ({}) must be >= restart.base_backoff_ms ({})",
            engine.restart.max_backoff_ms,
            engine.restart.base_backoff_ms
        );
        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => bail!("Unknown logging.format '{}': expected pretty or json", other),
        }

        let mut seen = HashSet::new();
        for strategy in &self.strategies {
            strategy
                .validate()
                .with_context(|| format!("Invalid strategy config '{}'", strategy.id))?;
            if !seen.insert(strategy.id.clone()) {
                bail!("Duplicate strategy id '{}'", strategy.id);
            }
        }
        Ok(())
    }
}

fn env_source(source: Option<config_crate::Map<String, String>>) -> Environment {
    // TORQ_ENGINE__MAX_STRATEGIES=4 -> engine.max_strategies
    Environment::with_prefix("TORQ")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(source)
}

/// Resolve the config path: explicit argument, then `TORQ_ENGINE_CONFIG`,
/// then `config/engine.toml`. Tilde and `$VAR` references are expanded.
pub fn resolve_config_path(explicit: Option<&str>) -> Result<PathBuf> {
    let raw = match explicit {
        Some(path) => path.to_string(),
        None => std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    };
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand config path '{}'", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
