//! Explicitly constructed engine state shared by every component

use crate::memory::{AdmissionGate, MemoryProbe, ProcessMemoryProbe};
use crate::rate_limit::OrderRateLimiter;
use crate::registry::StatsRegistry;
use std::sync::Arc;
use std::time::Instant;
use torq_engine_config::EngineSettings;
use torq_signal_bus::{SignalRouter, SignalSink};
use torq_strategies::StrategyFactory;
use torq_tick_stream::StreamHub;
use torq_types::StrategyConfig;
use uuid::Uuid;

/// Everything a worker or the supervisor needs. Several contexts can live
/// side by side; nothing here is global.
pub struct EngineContext {
    instance_id: Uuid,
    started_at: Instant,
    settings: EngineSettings,
    streams: Arc<StreamHub>,
    signals: Arc<SignalRouter>,
    registry: Arc<StatsRegistry>,
    rate_limiter: Arc<OrderRateLimiter>,
    admission: Arc<AdmissionGate>,
    factory: Arc<StrategyFactory>,
    sink_override: Option<Arc<dyn SignalSink>>,
}

impl EngineContext {
    /// Context with in-process transports, the built-in strategy variants and
    /// the process RSS probe
    pub fn new(settings: EngineSettings) -> Self {
        let streams = Arc::new(StreamHub::new(settings.tick_log_capacity));
        let signals = Arc::new(SignalRouter::new(settings.subscriber_queue_capacity));
        let registry = Arc::new(StatsRegistry::new(settings.health_window()));
        let rate_limiter = Arc::new(OrderRateLimiter::new(
            settings.max_orders_per_second,
            settings.rate_limit_timeout(),
        ));
        let admission = Arc::new(AdmissionGate::new(
            Arc::new(ProcessMemoryProbe),
            settings.memory_limit_bytes(),
        ));

        Self {
            instance_id: Uuid::new_v4(),
            started_at: Instant::now(),
            settings,
            streams,
            signals,
            registry,
            rate_limiter,
            admission,
            factory: Arc::new(StrategyFactory::with_builtin()),
            sink_override: None,
        }
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.admission = Arc::new(AdmissionGate::new(
            probe,
            self.settings.memory_limit_bytes(),
        ));
        self
    }

    pub fn with_factory(mut self, factory: StrategyFactory) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    /// Send every strategy's signals to `sink` instead of its configured
    /// channel
    pub fn with_sink(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.sink_override = Some(sink);
        self
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn streams(&self) -> &Arc<StreamHub> {
        &self.streams
    }

    pub fn signals(&self) -> &Arc<SignalRouter> {
        &self.signals
    }

    pub fn registry(&self) -> &Arc<StatsRegistry> {
        &self.registry
    }

    pub fn rate_limiter(&self) -> &Arc<OrderRateLimiter> {
        &self.rate_limiter
    }

    pub fn admission(&self) -> &Arc<AdmissionGate> {
        &self.admission
    }

    pub fn factory(&self) -> &Arc<StrategyFactory> {
        &self.factory
    }

    /// Publisher for a strategy's configured signal channel
    pub fn sink_for(&self, config: &StrategyConfig) -> Arc<dyn SignalSink> {
        match &self.sink_override {
            Some(sink) => Arc::clone(sink),
            None => {
                let bus: Arc<dyn SignalSink> =
                    self.signals.channel(&config.transport.signal_channel);
                bus
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_are_isolated() {
        let a = EngineContext::new(EngineSettings::default());
        let b = EngineContext::new(EngineSettings::default());
        assert_ne!(a.instance_id(), b.instance_id());

        a.streams().adapter("market_ticks");
        assert_eq!(a.streams().stream_names(), vec!["market_ticks".to_string()]);
        assert!(b.streams().stream_names().is_empty());
    }

    #[test]
    fn test_sink_follows_transport_channel() {
        let ctx = EngineContext::new(EngineSettings::default());
        let mut config = StrategyConfig::new("m1", "momentum", ["INFY"]);
        config.transport.signal_channel = "alpha".into();

        ctx.sink_for(&config);
        assert_eq!(ctx.signals().channel_stats().len(), 1);
        assert_eq!(ctx.signals().channel_stats()[0].0, "alpha");
    }
}
