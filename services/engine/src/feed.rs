//! Tick feeds for the engine binary
//!
//! - [`ReplayFeed`]: JSON-lines raw feed events from a file or stdin
//! - [`SyntheticFeed`]: seeded random walk per symbol
//!
//! Both retry `Backpressure` with exponential backoff and skip anything the
//! adapter refuses for other reasons (the adapter counts those).

use crate::shutdown::ShutdownToken;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use torq_tick_stream::{IngestError, TickSourceAdapter};
use torq_types::time::now_ns;
use torq_types::{MarketTick, SequenceId};
use tracing::{debug, info, warn};

const BACKOFF_BASE: Duration = Duration::from_millis(1);
const BACKOFF_MAX: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub accepted: u64,
    pub rejected: u64,
}

/// Run `attempt` until it stops failing with a retriable error, doubling the
/// pause each time. Gives up with the last error once `shutdown` fires.
pub async fn publish_with_backoff<F>(
    mut attempt: F,
    shutdown: &ShutdownToken,
) -> Result<SequenceId, IngestError>
where
    F: FnMut() -> Result<SequenceId, IngestError>,
{
    let mut delay = BACKOFF_BASE;
    loop {
        match attempt() {
            Err(e) if e.is_retriable() => {
                debug!(error = %e, delay_ms = delay.as_millis(), "Backing off");
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return Err(e),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = (delay * 2).min(BACKOFF_MAX);
            }
            other => return other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaySource {
    File(PathBuf),
    Stdin,
}

impl ReplaySource {
    /// `-` means stdin
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            ReplaySource::Stdin
        } else {
            ReplaySource::File(PathBuf::from(arg))
        }
    }
}

/// Replays recorded raw feed events, one JSON object per line.
/// Blank lines and `#` comments are ignored.
pub struct ReplayFeed {
    source: ReplaySource,
    pace: Option<Duration>,
}

impl ReplayFeed {
    pub fn new(source: ReplaySource) -> Self {
        Self { source, pace: None }
    }

    /// Pause between lines instead of replaying as fast as possible
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    pub async fn run(
        self,
        adapter: Arc<TickSourceAdapter>,
        shutdown: ShutdownToken,
    ) -> Result<FeedSummary> {
        let summary = match &self.source {
            ReplaySource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open replay file {}", path.display()))?;
                self.replay(BufReader::new(file), &adapter, &shutdown).await?
            }
            ReplaySource::Stdin => {
                self.replay(BufReader::new(tokio::io::stdin()), &adapter, &shutdown)
                    .await?
            }
        };

        info!(
            source = ?self.source,
            accepted = summary.accepted,
            rejected = summary.rejected,
            "Replay finished"
        );
        Ok(summary)
    }

    async fn replay<R>(
        &self,
        reader: R,
        adapter: &TickSourceAdapter,
        shutdown: &ShutdownToken,
    ) -> Result<FeedSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut summary = FeedSummary::default();
        let mut lines = reader.lines();
        let mut line_no = 0u64;

        loop {
            let line = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line.context("Failed to read replay input")?,
            };
            let Some(line) = line else {
                break;
            };
            line_no += 1;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match publish_with_backoff(|| adapter.ingest_json(line), shutdown).await {
                Ok(_) => summary.accepted += 1,
                Err(e) => {
                    summary.rejected += 1;
                    warn!(line = line_no, error = %e, "Skipping replay line");
                }
            }

            if let Some(pace) = self.pace {
                tokio::time::sleep(pace).await;
            }
        }
        Ok(summary)
    }
}

struct SymbolWalk {
    symbol: String,
    token: u64,
    open: Decimal,
    price: Decimal,
    volume: u64,
    last_ts: u64,
}

/// Random-walk ticks for a fixed symbol set, one tick per symbol per interval
pub struct SyntheticFeed {
    walks: Vec<SymbolWalk>,
    interval: Duration,
    /// Max fractional move per tick
    volatility: f64,
    rng: StdRng,
}

impl SyntheticFeed {
    pub fn new(symbols: &[String], interval: Duration) -> Self {
        Self::build(symbols, interval, StdRng::from_entropy())
    }

    /// Reproducible walk
    pub fn with_seed(symbols: &[String], interval: Duration, seed: u64) -> Self {
        Self::build(symbols, interval, StdRng::seed_from_u64(seed))
    }

    fn build(symbols: &[String], interval: Duration, mut rng: StdRng) -> Self {
        let walks = symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let open = Decimal::from(rng.gen_range(100u32..5_000));
                SymbolWalk {
                    symbol: symbol.clone(),
                    token: 256_265 + i as u64,
                    open,
                    price: open,
                    volume: 0,
                    last_ts: 0,
                }
            })
            .collect();
        Self {
            walks,
            interval,
            volatility: 0.002,
            rng,
        }
    }

    /// Advance every symbol one step
    pub fn next_batch(&mut self) -> Vec<MarketTick> {
        let tick_size = Decimal::new(5, 2);
        let mut batch = Vec::with_capacity(self.walks.len());

        for walk in &mut self.walks {
            let step: f64 = self.rng.gen_range(-1.0..1.0) * self.volatility;
            let multiplier = Decimal::ONE + Decimal::from_f64_retain(step).unwrap_or_default();
            walk.price = (walk.price * multiplier).round_dp(2).max(tick_size);
            walk.volume += self.rng.gen_range(1u64..500);

            let ts = now_ns().max(walk.last_ts + 1);
            walk.last_ts = ts;

            let change_pct = ((walk.price - walk.open) / walk.open * Decimal::ONE_HUNDRED).round_dp(4);
            let spread = tick_size;
            batch.push(
                MarketTick::new(walk.symbol.clone(), walk.price, ts)
                    .with_token(walk.token)
                    .with_quote((walk.price - spread).max(tick_size), walk.price + spread)
                    .with_change_pct(change_pct)
                    .with_volume(walk.volume),
            );
        }
        batch
    }

    /// Publish batches every interval until shutdown, or until `limit`
    /// batches have been sent
    pub async fn run(
        mut self,
        adapter: Arc<TickSourceAdapter>,
        shutdown: ShutdownToken,
        limit: Option<u64>,
    ) -> FeedSummary {
        let mut summary = FeedSummary::default();
        let mut interval = tokio::time::interval(self.interval);
        let mut batches = 0u64;

        info!(
            symbols = self.walks.len(),
            interval_ms = self.interval.as_millis(),
            "Synthetic feed started"
        );

        while limit.map_or(true, |limit| batches < limit) {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            for tick in self.next_batch() {
                let result =
                    publish_with_backoff(|| adapter.publish(tick.clone()), &shutdown).await;
                match result {
                    Ok(_) => summary.accepted += 1,
                    Err(e) => {
                        summary.rejected += 1;
                        debug!(error = %e, "Synthetic tick refused");
                    }
                }
            }
            batches += 1;
        }

        info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            "Synthetic feed stopped"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use torq_tick_stream::TickLog;

    fn adapter(capacity: usize) -> Arc<TickSourceAdapter> {
        Arc::new(TickSourceAdapter::new(Arc::new(TickLog::new(
            "market_ticks",
            capacity,
        ))))
    }

    #[tokio::test]
    async fn test_replay_file_skips_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# recorded session").unwrap();
        writeln!(
            file,
            r#"{{"tradingsymbol":"INFY","last_price":1500.5,"exchange_timestamp":1700000000000}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"tradingsymbol":"INFY"}}"#).unwrap();
        writeln!(
            file,
            r#"{{"tradingsymbol":"TCS","last_price":3400,"exchange_timestamp":"2024-01-02T09:15:00Z"}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let adapter = adapter(100);
        let summary = ReplayFeed::new(ReplaySource::File(file.path().to_path_buf()))
            .run(adapter.clone(), ShutdownToken::new())
            .await
            .unwrap();

        assert_eq!(summary, FeedSummary { accepted: 2, rejected: 1 });
        assert_eq!(adapter.log().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_replay_file_is_an_error() {
        let result = ReplayFeed::new(ReplaySource::parse("/nonexistent/ticks.jsonl"))
            .run(adapter(10), ShutdownToken::new())
            .await;
        assert!(result.is_err());
        assert_eq!(ReplaySource::parse("-"), ReplaySource::Stdin);
    }

    #[test]
    fn test_synthetic_walk_stays_positive_and_ordered() {
        let symbols = vec!["INFY".to_string(), "TCS".to_string()];
        let mut feed = SyntheticFeed::with_seed(&symbols, Duration::from_millis(10), 7);

        let mut last = [0u64; 2];
        for _ in 0..200 {
            let batch = feed.next_batch();
            assert_eq!(batch.len(), 2);
            for (i, tick) in batch.iter().enumerate() {
                assert_eq!(tick.symbol, symbols[i]);
                assert!(tick.last_price > Decimal::ZERO);
                assert!(tick.exchange_timestamp_ns > last[i]);
                last[i] = tick.exchange_timestamp_ns;
            }
        }
    }

    #[tokio::test]
    async fn test_synthetic_run_respects_limit() {
        let adapter = adapter(1_000);
        let feed = SyntheticFeed::with_seed(&["INFY".to_string()], Duration::from_millis(1), 1);
        let summary = feed.run(adapter.clone(), ShutdownToken::new(), Some(5)).await;

        assert_eq!(summary.accepted, 5);
        assert_eq!(adapter.log().len(), 5);
    }

    #[tokio::test]
    async fn test_backpressure_is_retried_until_space_frees() {
        let adapter = adapter(1);
        let mut consumer = adapter.log().consumer("slow");
        adapter
            .publish(MarketTick::new("INFY", Decimal::from(100), 1))
            .unwrap();

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            consumer.try_next();
            consumer.commit();
        });

        let sequence = publish_with_backoff(
            || adapter.publish(MarketTick::new("INFY", Decimal::from(101), 2)),
            &ShutdownToken::new(),
        )
        .await
        .unwrap();
        releaser.await.unwrap();

        assert_eq!(sequence, SequenceId(2));
        assert!(adapter.metrics().snapshot().backpressure >= 1);
    }

    #[tokio::test]
    async fn test_backoff_gives_up_on_shutdown() {
        let adapter = adapter(1);
        let _consumer = adapter.log().consumer("stuck");
        adapter
            .publish(MarketTick::new("INFY", Decimal::from(100), 1))
            .unwrap();

        let shutdown = ShutdownToken::new();
        shutdown.cancel();
        let result = publish_with_backoff(
            || adapter.publish(MarketTick::new("INFY", Decimal::from(101), 2)),
            &shutdown,
        )
        .await;
        assert!(matches!(result, Err(IngestError::Backpressure { .. })));
    }
}
