use thiserror::Error;

/// Tick ingestion failures; all are recoverable by the caller
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// A required field (symbol, timestamp, last price) is absent or unusable
    #[error("malformed tick: missing or invalid {field}")]
    Malformed { field: &'static str },

    /// Log is full; retry with backoff
    #[error("stream {stream} at capacity ({capacity} ticks)")]
    Backpressure { stream: String, capacity: usize },

    /// Tick is older than the last accepted tick for its symbol
    #[error("out-of-order tick for {symbol}: {timestamp_ns} < last accepted {last_ns}")]
    OutOfOrder {
        symbol: String,
        timestamp_ns: u64,
        last_ns: u64,
    },

    #[error("stream {stream} is closed")]
    Closed { stream: String },
}

impl IngestError {
    /// Whether retrying the same tick later can succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, IngestError::Backpressure { .. })
    }
}
