//! Single signal channel

use crate::error::PublishError;
use crate::subscription::{SubscriberQueue, Subscription};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use torq_types::time::now_ns;
use torq_types::{SignalEnvelope, StrategyId, TradingSignal};
use tracing::{debug, info, warn};

/// Anything a strategy worker can hand signals to
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn publish(&self, signal: TradingSignal) -> Result<DeliveryReceipt, PublishError>;
}

/// Outcome of one publish
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReceipt {
    pub channel: String,
    pub strategy_id: StrategyId,
    /// Per-strategy sequence assigned to this signal
    pub sequence: u64,
    /// Subscribers the signal was enqueued for
    pub subscribers: usize,
    /// Drops caused by this publish; recorded, not fatal
    #[serde(skip)]
    pub issues: Vec<PublishError>,
}

impl DeliveryReceipt {
    pub fn dropped(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, PublishError::SubscriberQueueFull { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub published: u64,
    pub rejected: u64,
    pub deliveries: u64,
    pub drops: u64,
    pub subscribers: usize,
}

/// One named pub/sub channel.
///
/// Publishing validates the signal, assigns the strategy's next sequence and
/// enqueues an envelope for each subscriber while holding that strategy's
/// sequence slot, which keeps per-strategy order identical in every queue.
pub struct SignalBus {
    channel: String,
    queue_capacity: usize,
    subscribers: RwLock<Vec<Arc<SubscriberQueue>>>,
    sequences: DashMap<StrategyId, u64>,
    next_subscriber_id: AtomicU64,
    published: AtomicU64,
    rejected: AtomicU64,
    deliveries: AtomicU64,
    drops: AtomicU64,
    closed: AtomicBool,
}

impl SignalBus {
    pub fn new(channel: impl Into<String>, queue_capacity: usize) -> Self {
        Self {
            channel: channel.into(),
            queue_capacity: queue_capacity.max(1),
            subscribers: RwLock::new(Vec::new()),
            sequences: DashMap::new(),
            next_subscriber_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            drops: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Subscribe with the channel's default queue capacity
    pub fn subscribe(self: &Arc<Self>, name: impl Into<String>) -> Subscription {
        self.subscribe_with_capacity(name, self.queue_capacity)
    }

    pub fn subscribe_with_capacity(
        self: &Arc<Self>,
        name: impl Into<String>,
        capacity: usize,
    ) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        let queue = Arc::new(SubscriberQueue::new(id, name.clone(), capacity));
        if self.closed.load(Ordering::Acquire) {
            queue.close();
        }
        self.subscribers.write().push(Arc::clone(&queue));
        info!(channel = %self.channel, subscriber = %name, id, capacity, "Subscriber attached");
        Subscription::new(queue, Arc::downgrade(self))
    }

    pub(crate) fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.write();
        if let Some(pos) = subscribers.iter().position(|s| s.id == id) {
            let queue = subscribers.remove(pos);
            debug!(channel = %self.channel, subscriber = %queue.name, "Subscriber detached");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Last sequence assigned to `strategy_id`, 0 if it never published
    pub fn last_sequence(&self, strategy_id: &StrategyId) -> u64 {
        self.sequences.get(strategy_id).map(|s| *s).unwrap_or(0)
    }

    /// Deliver a signal to every current subscriber.
    ///
    /// Never blocks on a slow subscriber. Overflow drops show up in
    /// [`DeliveryReceipt::issues`].
    pub fn publish(&self, signal: TradingSignal) -> Result<DeliveryReceipt, PublishError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed {
                channel: self.channel.clone(),
            });
        }
        if let Err(e) = signal.validate_values() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(channel = %self.channel, strategy_id = %signal.strategy_id, error = %e, "Rejected signal");
            return Err(e.into());
        }

        let strategy_id = signal.strategy_id.clone();
        let mut slot = self.sequences.entry(strategy_id.clone()).or_insert(0);
        *slot += 1;
        let sequence = *slot;

        let envelope = SignalEnvelope {
            channel: self.channel.clone(),
            sequence,
            published_at_ns: now_ns(),
            signal: Arc::new(signal),
        };

        let mut issues = Vec::new();
        let subscribers = self.subscribers.read();
        for queue in subscribers.iter() {
            if let Some(evicted) = queue.push(envelope.clone()) {
                warn!(
                    channel = %self.channel,
                    subscriber = %queue.name,
                    dropped_strategy = %evicted.signal.strategy_id,
                    dropped_sequence = evicted.sequence,
                    "Subscriber queue full, dropped oldest signal"
                );
                issues.push(PublishError::SubscriberQueueFull {
                    subscriber: queue.name.clone(),
                    dropped_strategy: evicted.signal.strategy_id.clone(),
                    dropped_sequence: evicted.sequence,
                });
            }
        }
        let delivered_to = subscribers.len();
        drop(subscribers);
        drop(slot);

        self.published.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(delivered_to as u64, Ordering::Relaxed);
        self.drops.fetch_add(issues.len() as u64, Ordering::Relaxed);

        debug!(
            channel = %self.channel,
            strategy_id = %strategy_id,
            sequence,
            subscribers = delivered_to,
            "Signal published"
        );

        Ok(DeliveryReceipt {
            channel: self.channel.clone(),
            strategy_id,
            sequence,
            subscribers: delivered_to,
            issues,
        })
    }

    /// Refuse further publishes; subscribers drain what is queued
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            for queue in self.subscribers.read().iter() {
                queue.close();
            }
            info!(channel = %self.channel, "Signal channel closed");
        }
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

#[async_trait]
impl SignalSink for SignalBus {
    async fn publish(&self, signal: TradingSignal) -> Result<DeliveryReceipt, PublishError> {
        SignalBus::publish(self, signal)
    }
}
