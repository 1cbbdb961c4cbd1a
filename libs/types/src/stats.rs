//! Strategy statistics and worker lifecycle states

use crate::strategy::StrategyId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy worker lifecycle.
///
/// `Stopped → Starting → Running → {Draining → Stopped | Faulted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Draining = 3,
    Faulted = 4,
}

impl WorkerState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Starting,
            2 => WorkerState::Running,
            3 => WorkerState::Draining,
            4 => WorkerState::Faulted,
            _ => WorkerState::Stopped,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Faulted)
                | (Running, Draining)
                | (Running, Faulted)
                | (Draining, Stopped)
                | (Draining, Faulted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Stopped | WorkerState::Faulted)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Draining => "draining",
            WorkerState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Most recent error recorded against a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub at_ns: u64,
}

/// Point-in-time copy of a strategy's registry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub strategy_id: StrategyId,
    /// Incremented each time the worker is (re)started
    pub generation: u32,
    pub state: WorkerState,
    pub ticks_processed: u64,
    pub signals_generated: u64,
    pub errors: u64,
    pub rate_limited: u64,
    pub publish_drops: u64,
    pub last_signal_at_ns: Option<u64>,
    pub started_at_ns: u64,
    pub healthy: bool,
    /// Disabled after exhausting automatic restarts
    pub parked: bool,
    pub last_error: Option<ErrorDetail>,
}
