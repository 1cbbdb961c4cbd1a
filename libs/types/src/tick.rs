//! Normalized market-data tick

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Global, strictly increasing position of a tick in a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(pub u64);

impl SequenceId {
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        SequenceId(self.0 + 1)
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical market-data event.
///
/// Immutable once created. Two ticks with the same `(symbol,
/// exchange_timestamp_ns)` are considered the same market event for
/// de-duplication purposes but are still stored separately by the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    pub symbol: String,
    /// Exchange-assigned instrument token
    pub instrument_token: u64,
    /// Last traded price
    pub last_price: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub day_high: Option<Decimal>,
    pub day_low: Option<Decimal>,
    pub volume: u64,
    /// Percent change versus previous close
    pub change_pct: Option<Decimal>,
    pub exchange_timestamp_ns: u64,
    pub ingested_at_ns: u64,
    /// Adapter-specific fields that have no canonical slot
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl MarketTick {
    /// Minimal tick with only the required fields populated
    pub fn new(symbol: impl Into<String>, last_price: Decimal, exchange_timestamp_ns: u64) -> Self {
        Self {
            symbol: symbol.into(),
            instrument_token: 0,
            last_price,
            bid: None,
            ask: None,
            day_high: None,
            day_low: None,
            volume: 0,
            change_pct: None,
            exchange_timestamp_ns,
            ingested_at_ns: 0,
            raw: BTreeMap::new(),
        }
    }

    pub fn with_token(mut self, token: u64) -> Self {
        self.instrument_token = token;
        self
    }

    pub fn with_quote(mut self, bid: Decimal, ask: Decimal) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self
    }

    pub fn with_change_pct(mut self, change_pct: Decimal) -> Self {
        self.change_pct = Some(change_pct);
        self
    }

    pub fn with_volume(mut self, volume: u64) -> Self {
        self.volume = volume;
        self
    }

    /// De-duplication key
    pub fn event_key(&self) -> (&str, u64) {
        (&self.symbol, self.exchange_timestamp_ns)
    }

    /// Midpoint of the top of book, if both sides are quoted
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }
}

/// A tick as stored in the stream: shared, immutable, and stamped with its
/// sequence id.
#[derive(Debug, Clone)]
pub struct SequencedTick {
    pub sequence: SequenceId,
    pub tick: Arc<MarketTick>,
}
