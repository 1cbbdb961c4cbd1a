use thiserror::Error;
use torq_types::{StrategyId, ValidationError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PublishError {
    #[error("signal channel {channel} is closed")]
    Closed { channel: String },

    /// Confidence or quantity out of range
    #[error("invalid signal: {0}")]
    InvalidSignal(#[from] ValidationError),

    /// A subscriber queue overflowed and lost its oldest signal.
    ///
    /// Reported inside a [`DeliveryReceipt`](crate::DeliveryReceipt), never
    /// returned as a publish failure.
    #[error("subscriber {subscriber} queue full: dropped {dropped_strategy}#{dropped_sequence}")]
    SubscriberQueueFull {
        subscriber: String,
        dropped_strategy: StrategyId,
        dropped_sequence: u64,
    },
}
