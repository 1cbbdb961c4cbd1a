//! Stats & Health Registry
//!
//! Per-strategy counters owned by the engine context. Workers only ever
//! increment; readers take point-in-time [`StrategyStats`] snapshots.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use torq_types::time::now_ns;
use torq_types::{ErrorDetail, StrategyId, StrategyStats, WorkerState};
use tracing::debug;

const HISTORY_LIMIT: usize = 16;

/// Live record for one worker generation
struct LiveStats {
    generation: u32,
    started_at_ns: u64,
    state: AtomicU8,
    ticks_processed: AtomicU64,
    signals_generated: AtomicU64,
    errors: AtomicU64,
    rate_limited: AtomicU64,
    publish_drops: AtomicU64,
    /// 0 until the first signal
    last_signal_at_ns: AtomicU64,
    parked: AtomicBool,
    last_error: Mutex<Option<ErrorDetail>>,
}

impl LiveStats {
    /// `last_error` carries over from the previous generation so a restart
    /// does not reset the health window
    fn new(generation: u32, last_error: Option<ErrorDetail>) -> Self {
        Self {
            generation,
            started_at_ns: now_ns(),
            state: AtomicU8::new(WorkerState::Stopped.as_u8()),
            ticks_processed: AtomicU64::new(0),
            signals_generated: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            publish_drops: AtomicU64::new(0),
            last_signal_at_ns: AtomicU64::new(0),
            parked: AtomicBool::new(false),
            last_error: Mutex::new(last_error),
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Aggregates across every live record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryTotals {
    pub ticks_processed: u64,
    pub signals_generated: u64,
    pub errors: u64,
    pub rate_limited: u64,
    pub publish_drops: u64,
    pub running: usize,
    pub faulted: usize,
    pub parked: usize,
}

pub struct StatsRegistry {
    records: DashMap<StrategyId, Arc<LiveStats>>,
    history: DashMap<StrategyId, Vec<StrategyStats>>,
    health_window: Duration,
}

impl StatsRegistry {
    /// `health_window`: how long a recorded error keeps a strategy unhealthy
    pub fn new(health_window: Duration) -> Self {
        Self {
            records: DashMap::new(),
            history: DashMap::new(),
            health_window,
        }
    }

    /// Start a fresh record for a new worker generation, retiring the
    /// previous one into history. Counters restart at zero; the last error
    /// is kept. Returns the new generation.
    pub fn register_instance(&self, id: &StrategyId) -> u32 {
        let previous = self.records.get(id).map(|r| Arc::clone(r.value()));
        let (generation, last_error) = match previous {
            Some(record) => {
                let retired = self.materialize(id, &record);
                let last_error = retired.last_error.clone();
                let mut history = self.history.entry(id.clone()).or_default();
                history.push(retired);
                if history.len() > HISTORY_LIMIT {
                    history.remove(0);
                }
                (record.generation + 1, last_error)
            }
            None => (1, None),
        };

        self.records.insert(
            id.clone(),
            Arc::new(LiveStats::new(generation, last_error)),
        );
        debug!(strategy_id = %id, generation, "Registered strategy instance");
        generation
    }

    pub fn contains(&self, id: &StrategyId) -> bool {
        self.records.contains_key(id)
    }

    pub fn remove(&self, id: &StrategyId) -> Option<StrategyStats> {
        self.records
            .remove(id)
            .map(|(id, record)| self.materialize(&id, &record))
    }

    fn record(&self, id: &StrategyId) -> Option<Arc<LiveStats>> {
        self.records.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn record_tick_processed(&self, id: &StrategyId) {
        if let Some(r) = self.record(id) {
            r.ticks_processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_signal_emitted(&self, id: &StrategyId) {
        if let Some(r) = self.record(id) {
            r.signals_generated.fetch_add(1, Ordering::Relaxed);
            r.last_signal_at_ns.fetch_max(now_ns(), Ordering::Relaxed);
        }
    }

    pub fn record_error(&self, id: &StrategyId, detail: impl Into<String>) {
        if let Some(r) = self.record(id) {
            r.errors.fetch_add(1, Ordering::Relaxed);
            *r.last_error.lock() = Some(ErrorDetail {
                message: detail.into(),
                at_ns: now_ns(),
            });
        }
    }

    pub fn record_rate_limited(&self, id: &StrategyId) {
        if let Some(r) = self.record(id) {
            r.rate_limited.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_publish_drops(&self, id: &StrategyId, drops: u64) {
        if drops == 0 {
            return;
        }
        if let Some(r) = self.record(id) {
            r.publish_drops.fetch_add(drops, Ordering::Relaxed);
        }
    }

    pub fn set_state(&self, id: &StrategyId, state: WorkerState) {
        if let Some(r) = self.record(id) {
            r.state.store(state.as_u8(), Ordering::Release);
        }
    }

    pub fn state(&self, id: &StrategyId) -> Option<WorkerState> {
        self.record(id).map(|r| r.state())
    }

    pub fn set_parked(&self, id: &StrategyId, parked: bool) {
        if let Some(r) = self.record(id) {
            r.parked.store(parked, Ordering::Release);
        }
    }

    pub fn is_parked(&self, id: &StrategyId) -> bool {
        self.record(id)
            .map(|r| r.parked.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Unhealthy while faulted, parked, or within `health_window` of the
    /// last recorded error. Unknown strategies are unhealthy.
    pub fn is_healthy(&self, id: &StrategyId) -> bool {
        self.record(id)
            .map(|r| self.healthy(&r, now_ns()))
            .unwrap_or(false)
    }

    fn healthy(&self, record: &LiveStats, now: u64) -> bool {
        if record.state() == WorkerState::Faulted || record.parked.load(Ordering::Acquire) {
            return false;
        }
        let window_ns = u64::try_from(self.health_window.as_nanos()).unwrap_or(u64::MAX);
        match record.last_error.lock().as_ref() {
            Some(err) => now.saturating_sub(err.at_ns) > window_ns,
            None => true,
        }
    }

    pub fn snapshot(&self, id: &StrategyId) -> Option<StrategyStats> {
        self.record(id).map(|r| self.materialize(id, &r))
    }

    /// Snapshots of every live record, ordered by strategy id
    pub fn snapshot_all(&self) -> Vec<StrategyStats> {
        let mut all: Vec<StrategyStats> = self
            .records
            .iter()
            .map(|entry| self.materialize(entry.key(), entry.value()))
            .collect();
        all.sort_by(|a, b| a.strategy_id.as_str().cmp(b.strategy_id.as_str()));
        all
    }

    /// Retired generations, oldest first
    pub fn history(&self, id: &StrategyId) -> Vec<StrategyStats> {
        self.history
            .get(id)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    pub fn totals(&self) -> RegistryTotals {
        let mut totals = RegistryTotals::default();
        for entry in self.records.iter() {
            let r = entry.value();
            totals.ticks_processed += r.ticks_processed.load(Ordering::Relaxed);
            totals.signals_generated += r.signals_generated.load(Ordering::Relaxed);
            totals.errors += r.errors.load(Ordering::Relaxed);
            totals.rate_limited += r.rate_limited.load(Ordering::Relaxed);
            totals.publish_drops += r.publish_drops.load(Ordering::Relaxed);
            match r.state() {
                WorkerState::Starting | WorkerState::Running | WorkerState::Draining => {
                    totals.running += 1
                }
                WorkerState::Faulted => totals.faulted += 1,
                WorkerState::Stopped => {}
            }
            if r.parked.load(Ordering::Relaxed) {
                totals.parked += 1;
            }
        }
        totals
    }

    fn materialize(&self, id: &StrategyId, record: &LiveStats) -> StrategyStats {
        let last_signal = record.last_signal_at_ns.load(Ordering::Relaxed);
        StrategyStats {
            strategy_id: id.clone(),
            generation: record.generation,
            state: record.state(),
            ticks_processed: record.ticks_processed.load(Ordering::Relaxed),
            signals_generated: record.signals_generated.load(Ordering::Relaxed),
            errors: record.errors.load(Ordering::Relaxed),
            rate_limited: record.rate_limited.load(Ordering::Relaxed),
            publish_drops: record.publish_drops.load(Ordering::Relaxed),
            last_signal_at_ns: (last_signal > 0).then_some(last_signal),
            started_at_ns: record.started_at_ns,
            healthy: self.healthy(record, now_ns()),
            parked: record.parked.load(Ordering::Relaxed),
            last_error: record.last_error.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> StrategyId {
        StrategyId::new(s)
    }

    #[test]
    fn test_counters_and_snapshot() {
        let registry = StatsRegistry::new(Duration::from_secs(60));
        registry.register_instance(&id("m1"));
        registry.set_state(&id("m1"), WorkerState::Running);

        registry.record_tick_processed(&id("m1"));
        registry.record_tick_processed(&id("m1"));
        registry.record_signal_emitted(&id("m1"));
        registry.record_rate_limited(&id("m1"));
        registry.record_publish_drops(&id("m1"), 3);

        let stats = registry.snapshot(&id("m1")).unwrap();
        assert_eq!(stats.generation, 1);
        assert_eq!(stats.state, WorkerState::Running);
        assert_eq!(stats.ticks_processed, 2);
        assert_eq!(stats.signals_generated, 1);
        assert_eq!(stats.rate_limited, 1);
        assert_eq!(stats.publish_drops, 3);
        assert!(stats.last_signal_at_ns.is_some());
        assert!(stats.healthy);
    }

    #[test]
    fn test_recent_error_marks_unhealthy() {
        let registry = StatsRegistry::new(Duration::from_secs(60));
        registry.register_instance(&id("m1"));
        registry.set_state(&id("m1"), WorkerState::Running);
        registry.record_error(&id("m1"), "invalid last price -5");

        assert!(!registry.is_healthy(&id("m1")));
        let stats = registry.snapshot(&id("m1")).unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(
            stats.last_error.map(|e| e.message),
            Some("invalid last price -5".to_string())
        );
    }

    #[test]
    fn test_error_outside_window_is_forgiven() {
        let registry = StatsRegistry::new(Duration::ZERO);
        registry.register_instance(&id("m1"));
        registry.record_error(&id("m1"), "old");
        std::thread::sleep(Duration::from_millis(2));
        assert!(registry.is_healthy(&id("m1")));

        registry.set_state(&id("m1"), WorkerState::Faulted);
        assert!(!registry.is_healthy(&id("m1")));
    }

    #[test]
    fn test_reregistration_retires_previous_generation() {
        let registry = StatsRegistry::new(Duration::from_secs(60));
        assert_eq!(registry.register_instance(&id("m1")), 1);
        registry.record_tick_processed(&id("m1"));
        registry.set_state(&id("m1"), WorkerState::Faulted);

        assert_eq!(registry.register_instance(&id("m1")), 2);
        let live = registry.snapshot(&id("m1")).unwrap();
        assert_eq!(live.ticks_processed, 0);
        assert_eq!(live.state, WorkerState::Stopped);

        let history = registry.history(&id("m1"));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].generation, 1);
        assert_eq!(history[0].ticks_processed, 1);
        assert_eq!(history[0].state, WorkerState::Faulted);
    }

    #[test]
    fn test_restart_keeps_recent_fault_unhealthy() {
        let registry = StatsRegistry::new(Duration::from_secs(60));
        registry.register_instance(&id("m1"));
        registry.set_state(&id("m1"), WorkerState::Running);
        registry.record_error(&id("m1"), "strategy panicked: overflow");
        registry.set_state(&id("m1"), WorkerState::Faulted);

        assert_eq!(registry.register_instance(&id("m1")), 2);
        registry.set_state(&id("m1"), WorkerState::Running);

        assert!(!registry.is_healthy(&id("m1")));
        let live = registry.snapshot(&id("m1")).unwrap();
        assert_eq!(live.errors, 0);
        assert!(!live.healthy);
        assert_eq!(
            live.last_error.map(|e| e.message),
            Some("strategy panicked: overflow".to_string())
        );
    }

    #[test]
    fn test_restart_after_window_is_healthy() {
        let registry = StatsRegistry::new(Duration::ZERO);
        registry.register_instance(&id("m1"));
        registry.record_error(&id("m1"), "old");
        std::thread::sleep(Duration::from_millis(2));

        registry.register_instance(&id("m1"));
        registry.set_state(&id("m1"), WorkerState::Running);
        assert!(registry.is_healthy(&id("m1")));
    }

    #[test]
    fn test_unknown_strategy() {
        let registry = StatsRegistry::new(Duration::from_secs(60));
        registry.record_tick_processed(&id("ghost"));
        assert!(registry.snapshot(&id("ghost")).is_none());
        assert!(!registry.is_healthy(&id("ghost")));
    }

    #[test]
    fn test_totals() {
        let registry = StatsRegistry::new(Duration::from_secs(60));
        for name in ["a", "b"] {
            registry.register_instance(&id(name));
            registry.record_tick_processed(&id(name));
        }
        registry.set_state(&id("a"), WorkerState::Running);
        registry.set_state(&id("b"), WorkerState::Faulted);
        registry.set_parked(&id("b"), true);

        let totals = registry.totals();
        assert_eq!(totals.ticks_processed, 2);
        assert_eq!(totals.running, 1);
        assert_eq!(totals.faulted, 1);
        assert_eq!(totals.parked, 1);
        assert_eq!(
            registry
                .snapshot_all()
                .iter()
                .map(|s| s.strategy_id.as_str())
                .collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }
}
