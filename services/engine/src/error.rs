//! Engine and worker error types

use thiserror::Error;
use torq_strategies::{DecisionError, ParamError};
use torq_types::{StrategyId, ValidationError};

/// Operator-facing supervisor errors. None of these are retried automatically.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("{configured} enabled strategies exceed max_strategies ({max})")]
    CapacityExceeded { configured: usize, max: usize },

    #[error("forced stop after grace period for: {}", forced.join(", "))]
    ShutdownTimeout { forced: Vec<String> },

    #[error("admission rejected: {reason}")]
    AdmissionRejected { reason: String },

    #[error("strategy '{0}' is already registered")]
    DuplicateStrategy(StrategyId),

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(StrategyId),

    #[error("strategy '{0}' is still active")]
    StrategyActive(StrategyId),

    #[error("engine is not running")]
    NotRunning,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("invalid strategy config: {0}")]
    InvalidConfig(#[from] ValidationError),
}

/// Why a worker left `Running` for `Faulted`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkerFault {
    #[error("invalid config: {0}")]
    Config(#[from] ValidationError),

    #[error("invalid parameters: {0}")]
    Params(#[from] ParamError),

    #[error("strategy failure: {0}")]
    Decision(DecisionError),

    #[error("strategy panicked: {0}")]
    Panicked(String),
}

impl WorkerFault {
    /// Config and parameter faults fail again on every restart
    pub fn is_config(&self) -> bool {
        matches!(self, WorkerFault::Config(_) | WorkerFault::Params(_))
    }
}

/// Terminal outcome of one worker run
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerExit {
    /// Drained after a stop request, or the tick stream closed
    Stopped,
    Faulted(WorkerFault),
}

impl WorkerExit {
    pub fn is_faulted(&self) -> bool {
        matches!(self, WorkerExit::Faulted(_))
    }
}
