//! Stats & Health endpoints backed by the supervisor

use crate::supervisor::EngineSupervisor;
use torq_health_check::{HealthProvider, HealthStatus, ServiceMetrics};
use torq_types::{StrategyId, StrategyStats};

impl HealthProvider for EngineSupervisor {
    fn service_name(&self) -> &str {
        "strategy_engine"
    }

    fn status(&self) -> HealthStatus {
        self.health_report().status
    }

    fn metrics(&self) -> ServiceMetrics {
        let ctx = self.context();
        let totals = ctx.registry().totals();
        let ingest = ctx.streams().total_stats();
        let signals_published = ctx
            .signals()
            .channel_stats()
            .iter()
            .map(|(_, stats)| stats.published)
            .sum();

        ServiceMetrics {
            ticks_ingested: ingest.ticks_ingested,
            ticks_processed: totals.ticks_processed,
            signals_published,
            errors: totals.errors,
            rate_limited: totals.rate_limited,
            publish_drops: totals.publish_drops,
            active_workers: totals.running,
            parked_strategies: totals.parked,
            admissions_open: ctx.admission().is_open(),
            memory_usage_bytes: ctx.admission().last_sample(),
            uptime_seconds: ctx.uptime_seconds(),
        }
    }

    fn strategies(&self) -> Vec<StrategyStats> {
        self.context().registry().snapshot_all()
    }

    fn strategy(&self, id: &str) -> Option<StrategyStats> {
        self.context().registry().snapshot(&StrategyId::from(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineContext;
    use crate::memory::FixedMemoryProbe;
    use std::sync::Arc;
    use torq_engine_config::EngineSettings;
    use torq_types::StrategyConfig;

    #[tokio::test]
    async fn test_metrics_reflect_running_engine() {
        let ctx = EngineContext::new(EngineSettings::default())
            .with_memory_probe(Arc::new(FixedMemoryProbe::new(1024)));
        let supervisor = EngineSupervisor::new(Arc::new(ctx));
        assert_eq!(HealthProvider::status(&supervisor), HealthStatus::Starting);

        supervisor
            .start(&[StrategyConfig::new("m1", "momentum", ["INFY"])])
            .unwrap();

        let metrics = HealthProvider::metrics(&supervisor);
        assert!(metrics.admissions_open);
        assert_eq!(metrics.memory_usage_bytes, 1024);
        assert!(supervisor.strategy("m1").is_some());
        assert!(supervisor.strategy("missing").is_none());
        assert_eq!(supervisor.strategies().len(), 1);

        supervisor.stop().await.unwrap();
    }
}
