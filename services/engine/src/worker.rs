//! Strategy Worker
//!
//! One task per strategy. The worker owns its decision state and a private
//! cursor in its consumer group; it talks to the rest of the engine only
//! through the tick stream, the signal sink and the stats registry.
//!
//! Lifecycle: `Stopped → Starting → Running → {Draining → Stopped | Faulted}`.
//! A stop request is observed between ticks, so a tick that has been
//! dequeued is always carried through to publish before draining.

use crate::context::EngineContext;
use crate::error::{WorkerExit, WorkerFault};
use crate::rate_limit::RateDecision;
use crate::shutdown::ShutdownToken;
use std::sync::Arc;
use std::time::Instant;
use torq_signal_bus::SignalSink;
use torq_strategies::Decision;
use torq_tick_stream::GroupConsumer;
use torq_types::{SequenceId, SequencedTick, StrategyConfig, StrategyId, WorkerState};
use tracing::{debug, error, info, warn};

pub struct StrategyWorker {
    config: StrategyConfig,
    ctx: Arc<EngineContext>,
    shutdown: ShutdownToken,
    state: WorkerState,
}

impl StrategyWorker {
    pub fn new(config: StrategyConfig, ctx: Arc<EngineContext>, shutdown: ShutdownToken) -> Self {
        Self {
            config,
            ctx,
            shutdown,
            state: WorkerState::Stopped,
        }
    }

    pub fn id(&self) -> &StrategyId {
        &self.config.id
    }

    /// Drive the worker to a terminal state
    pub async fn run(mut self) -> WorkerExit {
        let task_start = Instant::now();
        self.transition(WorkerState::Starting);

        let mut decision = match self.start() {
            Ok(decision) => decision,
            Err(fault) => return self.fault(fault),
        };

        let transport = &self.config.transport;
        let mut consumer = self
            .ctx
            .streams()
            .stream(&transport.stream)
            .consumer(&transport.consumer_group);
        let sink = self.ctx.sink_for(&self.config);

        self.transition(WorkerState::Running);
        info!(
            strategy_id = %self.config.id,
            strategy_type = %self.config.strategy_type,
            stream = %consumer.stream(),
            group = %consumer.group(),
            resume_from = consumer.position().value(),
            startup_duration_ms = task_start.elapsed().as_millis(),
            "Strategy worker running"
        );

        let commit_interval = self.ctx.settings().commit_interval.max(1);
        let mut since_commit = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                next = consumer.next() => next,
            };
            let Some(entry) = next else {
                break;
            };

            if let Err(fault) = self.process(decision.as_mut(), sink.as_ref(), &entry).await {
                // the faulting tick stays uncommitted and is replayed on restart
                consumer.commit_through(SequenceId(entry.sequence.value().saturating_sub(1)));
                return self.fault(fault);
            }

            since_commit += 1;
            if since_commit >= commit_interval {
                consumer.commit();
                since_commit = 0;
            }
        }

        self.drain(&consumer, task_start);
        WorkerExit::Stopped
    }

    /// Validate the config and resolve its parameter bag
    fn start(&self) -> Result<Box<dyn Decision>, WorkerFault> {
        self.config.validate()?;
        let decision = self.ctx.factory().build(&self.config)?;
        Ok(decision)
    }

    async fn process(
        &self,
        decision: &mut dyn Decision,
        sink: &dyn SignalSink,
        entry: &SequencedTick,
    ) -> Result<(), WorkerFault> {
        let tick = entry.tick.as_ref();
        if !self.config.subscribes_to(&tick.symbol) {
            return Ok(());
        }

        let id = &self.config.id;
        let registry = self.ctx.registry();
        registry.record_tick_processed(id);

        let draft = match decision.on_tick(tick) {
            Ok(Some(draft)) => draft,
            Ok(None) => return Ok(()),
            Err(e) if e.is_fatal() => return Err(WorkerFault::Decision(e)),
            Err(e) => {
                debug!(
                    strategy_id = %id,
                    sequence = entry.sequence.value(),
                    error = %e,
                    "Skipping tick"
                );
                registry.record_error(id, e.to_string());
                return Ok(());
            }
        };

        let signal = draft.into_signal(id.clone());
        if let Err(e) = signal.validate_for(&self.config.symbols) {
            warn!(strategy_id = %id, error = %e, "Rejected invalid signal");
            registry.record_error(id, format!("rejected signal: {}", e));
            return Ok(());
        }

        if self.ctx.rate_limiter().acquire().await == RateDecision::Dropped {
            warn!(
                strategy_id = %id,
                symbol = %signal.symbol,
                action = %signal.action,
                "Order budget exhausted, signal dropped"
            );
            registry.record_rate_limited(id);
            return Ok(());
        }

        let timeout = self.ctx.settings().publish_timeout();
        match tokio::time::timeout(timeout, sink.publish(signal)).await {
            Ok(Ok(receipt)) => {
                registry.record_signal_emitted(id);
                registry.record_publish_drops(id, receipt.dropped() as u64);
                debug!(
                    strategy_id = %id,
                    channel = %receipt.channel,
                    sequence = receipt.sequence,
                    subscribers = receipt.subscribers,
                    "Signal published"
                );
            }
            Ok(Err(e)) => {
                warn!(strategy_id = %id, error = %e, "Signal publish failed");
                registry.record_error(id, format!("publish failed: {}", e));
            }
            Err(_) => {
                warn!(
                    strategy_id = %id,
                    timeout_ms = timeout.as_millis(),
                    "Signal publish timed out"
                );
                registry.record_error(
                    id,
                    format!("publish timed out after {}ms", timeout.as_millis()),
                );
            }
        }
        Ok(())
    }

    fn drain(&mut self, consumer: &GroupConsumer, task_start: Instant) {
        self.transition(WorkerState::Draining);
        let committed = consumer.commit();
        self.transition(WorkerState::Stopped);
        info!(
            strategy_id = %self.config.id,
            committed = committed.value(),
            total_runtime_ms = task_start.elapsed().as_millis(),
            "Strategy worker stopped"
        );
    }

    fn fault(mut self, fault: WorkerFault) -> WorkerExit {
        error!(
            strategy_id = %self.config.id,
            error = %fault,
            "Strategy worker faulted"
        );
        self.ctx
            .registry()
            .record_error(&self.config.id, fault.to_string());
        self.transition(WorkerState::Faulted);
        WorkerExit::Faulted(fault)
    }

    fn transition(&mut self, next: WorkerState) {
        if !self.state.can_transition_to(next) {
            warn!(
                strategy_id = %self.config.id,
                from = %self.state,
                to = %next,
                "Unexpected worker state transition"
            );
        }
        self.state = next;
        self.ctx.registry().set_state(&self.config.id, next);
    }
}
