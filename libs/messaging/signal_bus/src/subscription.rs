//! Subscriber side of a signal channel

use crate::bus::SignalBus;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use torq_types::SignalEnvelope;

/// Bounded drop-oldest queue owned by one subscriber
pub(crate) struct SubscriberQueue {
    pub(crate) id: u64,
    pub(crate) name: String,
    capacity: usize,
    queue: Mutex<VecDeque<SignalEnvelope>>,
    notify: Notify,
    dropped: AtomicU64,
    enqueued: AtomicU64,
    closed: AtomicBool,
}

impl SubscriberQueue {
    pub(crate) fn new(id: u64, name: String, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            id,
            name,
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue, evicting the oldest entry when full. Returns the evicted
    /// envelope, if any.
    pub(crate) fn push(&self, envelope: SignalEnvelope) -> Option<SignalEnvelope> {
        let evicted = {
            let mut queue = self.queue.lock();
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(envelope);
            evicted
        };
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    fn pop(&self) -> Option<SignalEnvelope> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving handle for one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
    bus: Weak<SignalBus>,
}

impl Subscription {
    pub(crate) fn new(queue: Arc<SubscriberQueue>, bus: Weak<SignalBus>) -> Self {
        Self { queue, bus }
    }

    pub fn id(&self) -> u64 {
        self.queue.id
    }

    pub fn name(&self) -> &str {
        &self.queue.name
    }

    /// Take the next queued signal without waiting
    pub fn try_recv(&self) -> Option<SignalEnvelope> {
        self.queue.pop()
    }

    /// Wait for the next signal. Returns `None` once the channel is closed
    /// and this subscriber's queue is drained.
    pub async fn recv(&self) -> Option<SignalEnvelope> {
        loop {
            if let Some(envelope) = self.queue.pop() {
                return Some(envelope);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            // notify_one stores a permit, so a push between the pop above
            // and this await is not lost
            self.queue.notify.notified().await;
        }
    }

    /// Signals this subscriber lost to queue overflow
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Signals ever enqueued for this subscriber
    pub fn enqueued(&self) -> u64 {
        self.queue.enqueued.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.queue.queue.lock().len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.queue.id);
        }
    }
}
