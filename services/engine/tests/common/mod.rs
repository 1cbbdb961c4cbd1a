//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use torq_engine_config::{EngineSettings, RestartPolicy};
use torq_strategies::{Decision, DecisionError, SignalDraft, StrategyFactory};
use torq_strategy_engine::{EngineContext, FixedMemoryProbe};
use torq_types::{MarketTick, SignalAction, StrategyConfig};

/// Emits a BUY for every tick it sees
pub struct Echo;

impl Decision for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn on_tick(&mut self, tick: &MarketTick) -> Result<Option<SignalDraft>, DecisionError> {
        Ok(Some(SignalDraft::new(
            tick.symbol.clone(),
            SignalAction::Buy,
            0.5,
            tick.last_price,
            Decimal::ONE,
        )))
    }
}

/// Panics on a last price of exactly 13, echoes otherwise
pub struct Unlucky;

impl Decision for Unlucky {
    fn name(&self) -> &'static str {
        "unlucky"
    }

    fn on_tick(&mut self, tick: &MarketTick) -> Result<Option<SignalDraft>, DecisionError> {
        if tick.last_price == Decimal::from(13) {
            panic!("unlucky price for {}", tick.symbol);
        }
        Echo.on_tick(tick)
    }
}

/// Blocks its thread for `STALL` on every tick
pub struct Stall;

pub const STALL: Duration = Duration::from_millis(500);

impl Decision for Stall {
    fn name(&self) -> &'static str {
        "stall"
    }

    fn on_tick(&mut self, _tick: &MarketTick) -> Result<Option<SignalDraft>, DecisionError> {
        std::thread::sleep(STALL);
        Ok(None)
    }
}

/// Fast intervals, a generous order budget and restarts off
pub fn settings() -> EngineSettings {
    EngineSettings {
        max_orders_per_second: 10_000,
        execution_interval_ms: 20,
        shutdown_grace_ms: 2_000,
        commit_interval: 1,
        restart: RestartPolicy {
            enabled: false,
            max_attempts: 2,
            base_backoff_ms: 10,
            max_backoff_ms: 20,
        },
        ..EngineSettings::default()
    }
}

pub fn factory() -> StrategyFactory {
    let mut factory = StrategyFactory::with_builtin();
    factory.register("echo", |_| Ok(Box::new(Echo)));
    factory.register("unlucky", |_| Ok(Box::new(Unlucky)));
    factory.register("stall", |_| Ok(Box::new(Stall)));
    factory
}

/// Context with the echo variant and a small fixed memory reading
pub fn context(settings: EngineSettings) -> Arc<EngineContext> {
    Arc::new(
        EngineContext::new(settings)
            .with_factory(factory())
            .with_memory_probe(Arc::new(FixedMemoryProbe::new(1024))),
    )
}

pub fn echo(id: &str, symbols: &[&str]) -> StrategyConfig {
    StrategyConfig::new(id, "echo", symbols.iter().copied())
}

/// Publish `count` ticks with increasing prices and timestamps into the default stream
pub fn publish_ticks(ctx: &EngineContext, symbol: &str, count: u64) {
    let adapter = ctx.streams().adapter("market_ticks");
    for i in 1..=count {
        adapter
            .publish(MarketTick::new(symbol, Decimal::from(1_000 + i), i))
            .unwrap();
    }
}

/// Poll `condition` until it holds, panicking after five seconds
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

