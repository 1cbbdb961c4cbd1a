//! Named tick streams

use crate::adapter::{IngestStats, TickSourceAdapter};
use crate::log::TickLog;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Registry of tick streams by name, each with its own adapter.
///
/// Strategies bind to a stream through their transport coordinates; the
/// stream is created on first use.
pub struct StreamHub {
    capacity: usize,
    streams: DashMap<String, Arc<TickSourceAdapter>>,
}

impl StreamHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            streams: DashMap::new(),
        }
    }

    /// Adapter for `name`, creating the stream if needed
    pub fn adapter(&self, name: &str) -> Arc<TickSourceAdapter> {
        Arc::clone(
            self.streams
                .entry(name.to_string())
                .or_insert_with(|| {
                    info!(stream = name, capacity = self.capacity, "Created tick stream");
                    Arc::new(TickSourceAdapter::new(Arc::new(TickLog::new(
                        name,
                        self.capacity,
                    ))))
                })
                .value(),
        )
    }

    /// Log for `name`, creating the stream if needed
    pub fn stream(&self, name: &str) -> Arc<TickLog> {
        Arc::clone(self.adapter(name).log())
    }

    pub fn stream_names(&self) -> Vec<String> {
        self.streams.iter().map(|s| s.key().clone()).collect()
    }

    /// Ingest counters summed over every stream
    pub fn total_stats(&self) -> IngestStats {
        self.streams
            .iter()
            .map(|s| s.value().metrics().snapshot())
            .fold(IngestStats::default(), |acc, s| IngestStats {
                ticks_ingested: acc.ticks_ingested + s.ticks_ingested,
                malformed: acc.malformed + s.malformed,
                backpressure: acc.backpressure + s.backpressure,
                out_of_order: acc.out_of_order + s.out_of_order,
            })
    }

    /// Trim committed entries from every stream; returns ticks released
    pub fn trim_all(&self) -> usize {
        self.streams.iter().map(|s| s.value().log().trim()).sum()
    }

    pub fn close_all(&self) {
        for stream in self.streams.iter() {
            stream.value().log().close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use torq_types::MarketTick;

    #[test]
    fn test_same_name_returns_same_stream() {
        let hub = StreamHub::new(8);
        let a = hub.stream("ticks");
        let b = hub.stream("ticks");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(hub.stream_names(), vec!["ticks".to_string()]);
    }

    #[test]
    fn test_total_stats_sums_streams() {
        let hub = StreamHub::new(8);
        hub.adapter("a").publish(MarketTick::new("X", dec!(1), 1)).unwrap();
        hub.adapter("b").publish(MarketTick::new("Y", dec!(1), 1)).unwrap();
        assert_eq!(hub.total_stats().ticks_ingested, 2);
    }
}
