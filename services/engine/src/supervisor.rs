//! Engine Supervisor
//!
//! Owns the worker slots. Each slot task runs its strategy's worker and
//! restarts it after a fault with exponential backoff; once the restart
//! budget is spent the strategy is parked until [`EngineSupervisor::reset_strategy`].
//! Each worker generation runs on its own task; a panic inside strategy code
//! surfaces as a [`WorkerFault::Panicked`] fault like any other.
//!
//! Shutdown is cooperative: every slot is asked to drain, then anything
//! still running at the grace deadline is aborted and reported.

use crate::context::EngineContext;
use crate::error::{EngineError, WorkerExit, WorkerFault};
use crate::shutdown::ShutdownToken;
use crate::worker::StrategyWorker;
use futures::future::join_all;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinHandle};
use torq_health_check::HealthStatus;
use torq_types::{StrategyConfig, StrategyId, StrategyStats, WorkerState};
use tracing::{debug, error, info, warn};

struct WorkerSlot {
    config: StrategyConfig,
    shutdown: ShutdownToken,
    handle: JoinHandle<()>,
}

/// One worker generation on its own task, aborted when dropped so a forced
/// slot stop also ends the worker
struct WorkerTask(JoinHandle<WorkerExit>);

impl WorkerTask {
    fn spawn(worker: StrategyWorker) -> Self {
        Self(tokio::spawn(worker.run()))
    }

    async fn join(mut self) -> Result<WorkerExit, JoinError> {
        (&mut self.0).await
    }
}

impl Drop for WorkerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Monitor {
    shutdown: ShutdownToken,
    handle: JoinHandle<()>,
}

/// Aggregate engine health
#[derive(Debug, Clone, PartialEq)]
pub struct EngineHealth {
    pub status: HealthStatus,
    pub running: bool,
    pub admissions_open: bool,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub strategies: Vec<StrategyStats>,
}

impl EngineHealth {
    pub fn unhealthy_strategies(&self) -> Vec<&StrategyId> {
        self.strategies
            .iter()
            .filter(|s| !s.healthy)
            .map(|s| &s.strategy_id)
            .collect()
    }
}

pub struct EngineSupervisor {
    ctx: Arc<EngineContext>,
    slots: Mutex<HashMap<StrategyId, WorkerSlot>>,
    monitor: Mutex<Option<Monitor>>,
    running: AtomicBool,
}

impl EngineSupervisor {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            slots: Mutex::new(HashMap::new()),
            monitor: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn strategy_ids(&self) -> Vec<StrategyId> {
        let mut ids: Vec<StrategyId> = self.slots.lock().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// Start one worker per enabled config.
    ///
    /// More enabled configs than `max_strategies` is refused as a whole: no
    /// worker is started. Must be called from within a tokio runtime.
    pub fn start(&self, strategies: &[StrategyConfig]) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }

        let enabled: Vec<&StrategyConfig> = strategies.iter().filter(|s| s.enabled).collect();
        let max = self.ctx.settings().max_strategies;
        if enabled.len() > max {
            error!(
                configured = enabled.len(),
                max_strategies = max,
                "Refusing to start: too many enabled strategies"
            );
            return Err(EngineError::CapacityExceeded {
                configured: enabled.len(),
                max,
            });
        }

        let mut seen = HashSet::new();
        for config in &enabled {
            if !seen.insert(&config.id) {
                return Err(EngineError::DuplicateStrategy(config.id.clone()));
            }
        }

        self.ctx.admission().evaluate();
        let started = enabled.len();
        {
            let mut slots = self.slots.lock();
            for config in enabled {
                let slot = self.spawn_slot(config.clone());
                slots.insert(config.id.clone(), slot);
            }
        }
        self.spawn_monitor();
        self.running.store(true, Ordering::Release);

        info!(
            engine_id = %self.ctx.instance_id(),
            strategies = started,
            disabled = strategies.len() - started,
            "Strategy engine started"
        );
        Ok(())
    }

    /// Add a strategy while the engine is running
    pub fn admit(&self, config: StrategyConfig) -> Result<(), EngineError> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        config.validate()?;

        let mut slots = self.slots.lock();
        if slots.contains_key(&config.id) {
            return Err(EngineError::DuplicateStrategy(config.id.clone()));
        }
        let max = self.ctx.settings().max_strategies;
        if slots.len() >= max {
            return Err(EngineError::CapacityExceeded {
                configured: slots.len() + 1,
                max,
            });
        }
        if let Err(e) = self.ctx.admission().admit() {
            warn!(strategy_id = %config.id, error = %e, "Strategy admission rejected");
            return Err(e);
        }

        info!(
            strategy_id = %config.id,
            strategy_type = %config.strategy_type,
            "Admitting strategy"
        );
        let id = config.id.clone();
        let slot = self.spawn_slot(config);
        slots.insert(id, slot);
        Ok(())
    }

    /// Drain and remove one strategy. Its consumer group is released.
    pub async fn stop_strategy(&self, id: &StrategyId) -> Result<(), EngineError> {
        let slot = self
            .slots
            .lock()
            .remove(id)
            .ok_or_else(|| EngineError::UnknownStrategy(id.clone()))?;
        let transport = slot.config.transport.clone();

        let deadline = tokio::time::Instant::now() + self.ctx.settings().shutdown_grace();
        let forced = self.drain_slots(vec![(id.clone(), slot)], deadline).await;

        self.ctx
            .streams()
            .stream(&transport.stream)
            .drop_group(&transport.consumer_group);
        info!(strategy_id = %id, "Strategy removed");

        if forced.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ShutdownTimeout { forced })
        }
    }

    /// Manual intervention for a faulted or parked strategy: restart it with
    /// a fresh restart budget
    pub fn reset_strategy(&self, id: &StrategyId) -> Result<(), EngineError> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        let mut slots = self.slots.lock();
        let slot = slots
            .get(id)
            .ok_or_else(|| EngineError::UnknownStrategy(id.clone()))?;
        if !slot.handle.is_finished() {
            return Err(EngineError::StrategyActive(id.clone()));
        }

        info!(
            strategy_id = %id,
            was_parked = self.ctx.registry().is_parked(id),
            "Resetting strategy"
        );
        let config = slot.config.clone();
        let slot = self.spawn_slot(config);
        slots.insert(id.clone(), slot);
        Ok(())
    }

    /// Drain every worker, forcing out any still running at the grace deadline
    pub async fn stop(&self) -> Result<(), EngineError> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Err(EngineError::NotRunning);
        }
        info!(engine_id = %self.ctx.instance_id(), "Stopping strategy engine");

        let grace = self.ctx.settings().shutdown_grace();
        let deadline = tokio::time::Instant::now() + grace;

        let monitor = self.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.shutdown.cancel();
            if let Err(e) = monitor.handle.await {
                warn!("Engine monitor ended abnormally: {}", e);
            }
        }

        let slots: Vec<(StrategyId, WorkerSlot)> = self.slots.lock().drain().collect();
        let count = slots.len();
        let forced = self.drain_slots(slots, deadline).await;

        if forced.is_empty() {
            info!(
                engine_id = %self.ctx.instance_id(),
                workers = count,
                "Strategy engine stopped"
            );
            Ok(())
        } else {
            warn!(
                engine_id = %self.ctx.instance_id(),
                forced = ?forced,
                grace_ms = grace.as_millis(),
                "Strategy engine stopped with forced terminations"
            );
            Err(EngineError::ShutdownTimeout { forced })
        }
    }

    /// Ask every slot to drain, wait until `deadline`, abort the rest.
    /// Returns the ids that had to be aborted.
    async fn drain_slots(
        &self,
        slots: Vec<(StrategyId, WorkerSlot)>,
        deadline: tokio::time::Instant,
    ) -> Vec<String> {
        for (_, slot) in &slots {
            slot.shutdown.cancel();
        }

        let registry = Arc::clone(self.ctx.registry());
        let waits = slots.into_iter().map(|(id, mut slot)| {
            let registry = Arc::clone(&registry);
            async move {
                match tokio::time::timeout_at(deadline, &mut slot.handle).await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => {
                        error!(strategy_id = %id, "Worker task failed: {}", e);
                        None
                    }
                    Err(_) => {
                        slot.handle.abort();
                        registry.set_state(&id, WorkerState::Stopped);
                        warn!(strategy_id = %id, "Forced stop after grace period");
                        Some(id.to_string())
                    }
                }
            }
        });

        let mut forced: Vec<String> = join_all(waits).await.into_iter().flatten().collect();
        forced.sort();
        forced
    }

    fn spawn_slot(&self, config: StrategyConfig) -> WorkerSlot {
        let shutdown = ShutdownToken::new();
        let handle = tokio::spawn(supervise(
            config.clone(),
            Arc::clone(&self.ctx),
            shutdown.clone(),
        ));
        WorkerSlot {
            config,
            shutdown,
            handle,
        }
    }

    fn spawn_monitor(&self) {
        let shutdown = ShutdownToken::new();
        let handle = tokio::spawn(monitor(Arc::clone(&self.ctx), shutdown.clone()));
        *self.monitor.lock() = Some(Monitor { shutdown, handle });
    }

    /// Aggregate health across the engine and every strategy
    pub fn health_report(&self) -> EngineHealth {
        let strategies = self.ctx.registry().snapshot_all();
        let admission = self.ctx.admission();
        let running = self.is_running();
        let admissions_open = admission.is_open();

        let unhealthy = strategies.iter().filter(|s| !s.healthy).count();
        let status = if !running {
            HealthStatus::Starting
        } else if !strategies.is_empty() && unhealthy == strategies.len() {
            HealthStatus::Unhealthy
        } else if unhealthy > 0 || !admissions_open {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        EngineHealth {
            status,
            running,
            admissions_open,
            memory_usage_bytes: admission.last_sample(),
            memory_limit_bytes: admission.limit_bytes(),
            strategies,
        }
    }
}

/// Slot task: run the worker, restart on transient faults, park when the
/// restart budget is spent
async fn supervise(config: StrategyConfig, ctx: Arc<EngineContext>, shutdown: ShutdownToken) {
    let id = config.id.clone();
    let policy = ctx.settings().restart.clone();
    let registry = Arc::clone(ctx.registry());
    let mut attempt = 0u32;

    loop {
        let generation = registry.register_instance(&id);
        debug!(strategy_id = %id, generation, "Launching worker");

        let run_start = Instant::now();
        let worker = StrategyWorker::new(config.clone(), Arc::clone(&ctx), shutdown.clone());
        let exit = match WorkerTask::spawn(worker).join().await {
            Ok(exit) => exit,
            Err(e) if e.is_panic() => {
                let fault = WorkerFault::Panicked(panic_message(e.into_panic()));
                error!(strategy_id = %id, error = %fault, "Strategy worker panicked");
                registry.record_error(&id, fault.to_string());
                registry.set_state(&id, WorkerState::Faulted);
                WorkerExit::Faulted(fault)
            }
            Err(_) => return,
        };

        let fault = match exit {
            WorkerExit::Stopped => return,
            WorkerExit::Faulted(fault) => fault,
        };
        if shutdown.is_cancelled() {
            return;
        }
        if fault.is_config() {
            error!(
                strategy_id = %id,
                error = %fault,
                "Strategy config rejected, not restarting"
            );
            return;
        }
        if !policy.enabled {
            warn!(strategy_id = %id, "Automatic restart disabled, strategy stays faulted");
            return;
        }

        // a long healthy run earns back the restart budget
        if run_start.elapsed() >= ctx.settings().health_window() {
            attempt = 0;
        }
        attempt += 1;

        if attempt > policy.max_attempts {
            ctx.streams()
                .stream(&config.transport.stream)
                .drop_group(&config.transport.consumer_group);
            registry.set_parked(&id, true);
            error!(
                strategy_id = %id,
                restart_count = attempt - 1,
                max_restarts = policy.max_attempts,
                "Strategy exceeded restart limit, parked until reset"
            );
            return;
        }

        let backoff = policy.backoff_for(attempt);
        warn!(
            strategy_id = %id,
            restart_count = attempt,
            max_restarts = policy.max_attempts,
            backoff_ms = backoff.as_millis(),
            "Restarting faulted strategy"
        );
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Periodic housekeeping: memory ceiling and log trimming
async fn monitor(ctx: Arc<EngineContext>, shutdown: ShutdownToken) {
    let mut interval = tokio::time::interval(ctx.settings().execution_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        let admissions_open = ctx.admission().evaluate();
        let trimmed = ctx.streams().trim_all();
        let totals = ctx.registry().totals();
        debug!(
            admissions_open,
            trimmed,
            running = totals.running,
            faulted = totals.faulted,
            ticks_processed = totals.ticks_processed,
            signals_generated = totals.signals_generated,
            "Engine monitor tick"
        );
    }
}
