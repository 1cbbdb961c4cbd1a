//! Default configuration values
//!
//! Sized for constrained hosts: a few hundred megabytes and tens of
//! concurrent strategies.

/// Engine budget defaults
pub mod engine {
    /// Concurrent strategy slots
    pub const MAX_STRATEGIES: usize = 20;

    /// Shared order-rate token bucket (signals per second)
    pub const MAX_ORDERS_PER_SECOND: u32 = 10;

    /// Soft memory ceiling for runtime admissions (megabytes)
    pub const MEMORY_LIMIT_MB: u64 = 512;

    /// Feed polling cadence (milliseconds)
    pub const DATA_REFRESH_INTERVAL_MS: u64 = 1_000;

    /// Supervisor monitoring cadence (milliseconds)
    pub const EXECUTION_INTERVAL_MS: u64 = 1_000;

    /// Worker drain grace period on stop (milliseconds)
    pub const SHUTDOWN_GRACE_MS: u64 = 5_000;

    /// Health window: an error newer than this marks a strategy unhealthy (seconds)
    pub const HEALTH_WINDOW_SECS: u64 = 60;
}

/// Worker suspension-point timeouts
pub mod worker {
    /// Bounded wait for signal delivery (milliseconds)
    pub const PUBLISH_TIMEOUT_MS: u64 = 500;

    /// Bounded wait for an order-rate token (milliseconds)
    pub const RATE_LIMIT_TIMEOUT_MS: u64 = 250;

    /// Processed ticks between consumer-group commits
    pub const COMMIT_INTERVAL: u64 = 64;
}

/// Stream and channel sizing
pub mod transport {
    /// Retained ticks per stream before ingest reports backpressure
    pub const TICK_LOG_CAPACITY: usize = 100_000;

    /// Per-subscriber signal queue depth
    pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 1_024;
}

/// Automatic restart defaults
pub mod restart {
    pub const ENABLED: bool = true;

    pub const MAX_ATTEMPTS: u32 = 5;

    pub const BASE_BACKOFF_MS: u64 = 500;

    /// Hard ceiling on a single backoff delay
    pub const MAX_BACKOFF_MS: u64 = 30_000;
}

/// Monitoring endpoint defaults
pub mod health {
    pub const PORT: u16 = 8090;
}
