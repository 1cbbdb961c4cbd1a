use crate::bus::{BusStats, SignalBus};
use crate::subscription::Subscription;
use dashmap::DashMap;
use std::sync::Arc;

/// Signal channels by name, created on first use
pub struct SignalRouter {
    queue_capacity: usize,
    channels: DashMap<String, Arc<SignalBus>>,
}

impl SignalRouter {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            channels: DashMap::new(),
        }
    }

    pub fn channel(&self, name: &str) -> Arc<SignalBus> {
        Arc::clone(
            self.channels
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(SignalBus::new(name, self.queue_capacity)))
                .value(),
        )
    }

    pub fn subscribe(&self, channel: &str, subscriber: &str) -> Subscription {
        self.channel(channel).subscribe(subscriber)
    }

    pub fn channel_stats(&self) -> Vec<(String, BusStats)> {
        let mut stats: Vec<_> = self
            .channels
            .iter()
            .map(|c| (c.key().clone(), c.value().stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    pub fn close_all(&self) {
        for channel in self.channels.iter() {
            channel.value().close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_are_isolated() {
        let router = SignalRouter::new(4);
        let a = router.channel("a");
        let _sub = router.subscribe("a", "watcher");
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(router.channel("b").subscriber_count(), 0);
        assert_eq!(router.channel_stats().len(), 2);
    }
}
