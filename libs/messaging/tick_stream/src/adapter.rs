//! Tick Source Adapter
//!
//! Validates and normalizes incoming market data, enforces per-symbol
//! timestamp order and appends accepted ticks to a [`TickLog`].

use crate::error::IngestError;
use crate::log::TickLog;
use chrono::DateTime;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use torq_types::time::{millis_to_ns, now_ns};
use torq_types::{MarketTick, SequenceId};
use tracing::{debug, trace};

/// Ingest counters, readable without locks
#[derive(Debug, Default)]
pub struct IngestMetrics {
    pub ticks_ingested: AtomicU64,
    pub malformed: AtomicU64,
    pub backpressure: AtomicU64,
    pub out_of_order: AtomicU64,
}

/// Serializable copy of [`IngestMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub ticks_ingested: u64,
    pub malformed: u64,
    pub backpressure: u64,
    pub out_of_order: u64,
}

impl IngestMetrics {
    pub fn snapshot(&self) -> IngestStats {
        IngestStats {
            ticks_ingested: self.ticks_ingested.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            backpressure: self.backpressure.load(Ordering::Relaxed),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
        }
    }

    fn record_failure(&self, error: &IngestError) {
        let counter = match error {
            IngestError::Malformed { .. } => &self.malformed,
            IngestError::Backpressure { .. } => &self.backpressure,
            IngestError::OutOfOrder { .. } => &self.out_of_order,
            IngestError::Closed { .. } => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Raw feed record as delivered by the broker websocket or a replay file.
///
/// Every field is optional here; [`TickSourceAdapter::ingest_raw`] decides
/// what is required. Unknown fields land in the tick's raw payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTickEvent {
    #[serde(alias = "symbol")]
    pub tradingsymbol: Option<String>,
    pub instrument_token: Option<u64>,
    pub last_price: Option<Decimal>,
    #[serde(alias = "volume")]
    pub volume_traded: Option<u64>,
    /// Percent change versus previous close
    pub change: Option<Decimal>,
    pub ohlc: Option<RawOhlc>,
    pub depth: Option<RawDepth>,
    pub exchange_timestamp: Option<RawTimestamp>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOhlc {
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDepth {
    #[serde(default)]
    pub buy: Vec<RawLevel>,
    #[serde(default)]
    pub sell: Vec<RawLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLevel {
    pub price: Decimal,
    #[serde(default)]
    pub quantity: u64,
}

/// Epoch milliseconds or an RFC 3339 string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    EpochMillis(u64),
    Text(String),
}

impl RawTimestamp {
    fn to_ns(&self) -> Option<u64> {
        match self {
            RawTimestamp::EpochMillis(ms) => Some(millis_to_ns(*ms)),
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .and_then(|dt| dt.timestamp_nanos_opt())
                .and_then(|ns| u64::try_from(ns).ok()),
        }
    }
}

/// Normalizes feed events and appends them to one stream
pub struct TickSourceAdapter {
    log: Arc<TickLog>,
    last_accepted: DashMap<String, u64>,
    metrics: Arc<IngestMetrics>,
}

impl TickSourceAdapter {
    pub fn new(log: Arc<TickLog>) -> Self {
        Self {
            log,
            last_accepted: DashMap::new(),
            metrics: Arc::new(IngestMetrics::default()),
        }
    }

    pub fn log(&self) -> &Arc<TickLog> {
        &self.log
    }

    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    /// Append a canonical tick.
    ///
    /// Assigns the next global sequence id and bumps the ingested counter on
    /// success. An empty symbol or a zero exchange timestamp counts as absent.
    pub fn publish(&self, mut tick: MarketTick) -> Result<SequenceId, IngestError> {
        let result = self.publish_inner(&mut tick);
        match &result {
            Ok(sequence) => {
                self.metrics.ticks_ingested.fetch_add(1, Ordering::Relaxed);
                trace!(stream = %self.log.name(), symbol = %tick.symbol, %sequence, "Tick ingested");
            }
            Err(e) => {
                self.metrics.record_failure(e);
                debug!(stream = %self.log.name(), error = %e, "Tick refused");
            }
        }
        result
    }

    fn publish_inner(&self, tick: &mut MarketTick) -> Result<SequenceId, IngestError> {
        if tick.symbol.trim().is_empty() {
            return Err(IngestError::Malformed { field: "symbol" });
        }
        if tick.exchange_timestamp_ns == 0 {
            return Err(IngestError::Malformed {
                field: "exchange_timestamp",
            });
        }
        if tick.ingested_at_ns == 0 {
            tick.ingested_at_ns = now_ns();
        }

        // The shard lock serializes the order check and the append per symbol
        let mut last = self.last_accepted.entry(tick.symbol.clone()).or_insert(0);
        let timestamp_ns = tick.exchange_timestamp_ns;
        if timestamp_ns < *last {
            return Err(IngestError::OutOfOrder {
                symbol: tick.symbol.clone(),
                timestamp_ns,
                last_ns: *last,
            });
        }

        let sequence = self.log.append(tick.clone())?;
        *last = timestamp_ns;
        Ok(sequence)
    }

    /// Normalize a raw feed record and publish it
    pub fn ingest_raw(&self, raw: RawTickEvent) -> Result<SequenceId, IngestError> {
        match normalize(raw) {
            Ok(tick) => self.publish(tick),
            Err(e) => {
                self.metrics.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Parse one JSON feed line and publish it
    pub fn ingest_json(&self, line: &str) -> Result<SequenceId, IngestError> {
        match serde_json::from_str::<RawTickEvent>(line) {
            Ok(raw) => self.ingest_raw(raw),
            Err(_) => {
                let error = IngestError::Malformed { field: "payload" };
                self.metrics.record_failure(&error);
                Err(error)
            }
        }
    }
}

/// Map a raw feed record onto the canonical tick
pub fn normalize(raw: RawTickEvent) -> Result<MarketTick, IngestError> {
    let symbol = raw
        .tradingsymbol
        .filter(|s| !s.trim().is_empty())
        .ok_or(IngestError::Malformed { field: "symbol" })?;
    let last_price = raw
        .last_price
        .ok_or(IngestError::Malformed { field: "last_price" })?;
    let exchange_timestamp_ns = raw
        .exchange_timestamp
        .as_ref()
        .and_then(RawTimestamp::to_ns)
        .filter(|ns| *ns > 0)
        .ok_or(IngestError::Malformed {
            field: "exchange_timestamp",
        })?;

    let (bid, ask) = match &raw.depth {
        Some(depth) => (
            depth.buy.first().map(|l| l.price),
            depth.sell.first().map(|l| l.price),
        ),
        None => (None, None),
    };
    let (day_high, day_low, open, close) = match &raw.ohlc {
        Some(ohlc) => (ohlc.high, ohlc.low, ohlc.open, ohlc.close),
        None => (None, None, None, None),
    };

    let mut extra = raw.extra;
    if let Some(open) = open {
        extra.insert("open".to_string(), serde_json::Value::String(open.to_string()));
    }
    if let Some(close) = close {
        extra.insert("close".to_string(), serde_json::Value::String(close.to_string()));
    }

    Ok(MarketTick {
        symbol,
        instrument_token: raw.instrument_token.unwrap_or(0),
        last_price,
        bid,
        ask,
        day_high,
        day_low,
        volume: raw.volume_traded.unwrap_or(0),
        change_pct: raw.change,
        exchange_timestamp_ns,
        ingested_at_ns: now_ns(),
        raw: extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter(capacity: usize) -> TickSourceAdapter {
        TickSourceAdapter::new(Arc::new(TickLog::new("ticks", capacity)))
    }

    #[test]
    fn test_publish_counts_ingested() {
        let adapter = adapter(10);
        adapter.publish(MarketTick::new("INFY", dec!(1500), 1)).unwrap();
        adapter.publish(MarketTick::new("TCS", dec!(3500), 1)).unwrap();
        assert_eq!(adapter.metrics().snapshot().ticks_ingested, 2);
    }

    #[test]
    fn test_missing_symbol_is_malformed() {
        let adapter = adapter(10);
        let err = adapter.publish(MarketTick::new("", dec!(1), 1)).unwrap_err();
        assert_eq!(err, IngestError::Malformed { field: "symbol" });
        assert_eq!(adapter.metrics().snapshot().malformed, 1);
        assert_eq!(adapter.metrics().snapshot().ticks_ingested, 0);
    }

    #[test]
    fn test_out_of_order_tick_refused_per_symbol() {
        let adapter = adapter(10);
        adapter.publish(MarketTick::new("INFY", dec!(1), 100)).unwrap();
        // other symbols are unaffected
        adapter.publish(MarketTick::new("TCS", dec!(1), 50)).unwrap();

        let err = adapter.publish(MarketTick::new("INFY", dec!(1), 99)).unwrap_err();
        assert!(matches!(err, IngestError::OutOfOrder { last_ns: 100, .. }));
        assert_eq!(adapter.metrics().snapshot().out_of_order, 1);
    }

    #[test]
    fn test_refused_append_does_not_advance_symbol_clock() {
        let log = Arc::new(TickLog::new("ticks", 1));
        let _consumer = log.consumer("g");
        let adapter = TickSourceAdapter::new(Arc::clone(&log));

        adapter.publish(MarketTick::new("INFY", dec!(1), 10)).unwrap();
        let err = adapter.publish(MarketTick::new("INFY", dec!(1), 20)).unwrap_err();
        assert!(matches!(err, IngestError::Backpressure { .. }));
        assert_eq!(adapter.metrics().snapshot().backpressure, 1);

        // a tick between the accepted and refused timestamps is still in order
        log.drop_group("g");
        adapter.publish(MarketTick::new("INFY", dec!(1), 15)).unwrap();
    }

    #[test]
    fn test_normalize_kite_style_record() {
        let line = r#"{
            "tradingsymbol": "INFY",
            "instrument_token": 408065,
            "last_price": 1502.35,
            "volume_traded": 120000,
            "change": 0.85,
            "ohlc": {"open": 1490.0, "high": 1510.5, "low": 1488.0, "close": 1489.7},
            "depth": {"buy": [{"price": 1502.3, "quantity": 10}], "sell": [{"price": 1502.4, "quantity": 5}]},
            "exchange_timestamp": 1700000000000,
            "mode": "full"
        }"#;
        let raw: RawTickEvent = serde_json::from_str(line).unwrap();
        let tick = normalize(raw).unwrap();

        assert_eq!(tick.symbol, "INFY");
        assert_eq!(tick.instrument_token, 408065);
        assert_eq!(tick.last_price, dec!(1502.35));
        assert_eq!(tick.bid, Some(dec!(1502.3)));
        assert_eq!(tick.ask, Some(dec!(1502.4)));
        assert_eq!(tick.day_high, Some(dec!(1510.5)));
        assert_eq!(tick.exchange_timestamp_ns, 1_700_000_000_000_000_000);
        assert_eq!(tick.raw["mode"], "full");
        assert!(tick.raw.contains_key("open"));
    }

    #[test]
    fn test_normalize_rfc3339_timestamp() {
        let raw = RawTickEvent {
            tradingsymbol: Some("TCS".to_string()),
            last_price: Some(dec!(3500)),
            exchange_timestamp: Some(RawTimestamp::Text("2024-01-02T09:15:00Z".to_string())),
            ..Default::default()
        };
        let tick = normalize(raw).unwrap();
        assert_eq!(tick.exchange_timestamp_ns, 1_704_186_900_000_000_000);
    }

    #[test]
    fn test_ingest_raw_requires_last_price() {
        let adapter = adapter(10);
        let raw = RawTickEvent {
            tradingsymbol: Some("INFY".to_string()),
            exchange_timestamp: Some(RawTimestamp::EpochMillis(1)),
            ..Default::default()
        };
        assert_eq!(
            adapter.ingest_raw(raw).unwrap_err(),
            IngestError::Malformed {
                field: "last_price"
            }
        );
        assert_eq!(adapter.metrics().snapshot().malformed, 1);
    }

    #[test]
    fn test_ingest_json_rejects_garbage() {
        let adapter = adapter(10);
        assert!(adapter.ingest_json("not json").is_err());
        assert_eq!(adapter.metrics().snapshot().malformed, 1);
    }
}
