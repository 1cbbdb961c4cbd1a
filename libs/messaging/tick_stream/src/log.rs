//! Append-only tick log with named consumer groups

use crate::error::IngestError;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use torq_types::{MarketTick, SequenceId, SequencedTick};
use tracing::{debug, warn};

/// Committed position of one consumer group: the next sequence it has not
/// yet acknowledged.
#[derive(Debug)]
struct GroupOffset {
    committed: AtomicU64,
}

struct LogEntries {
    entries: VecDeque<SequencedTick>,
    next_seq: u64,
}

impl LogEntries {
    fn first_seq(&self) -> u64 {
        self.entries
            .front()
            .map(|e| e.sequence.value())
            .unwrap_or(self.next_seq)
    }
}

/// Bounded, in-memory, multi-consumer tick log.
///
/// Sequence ids start at 1. Readers hold cheap `Arc` clones of stored ticks
/// and never block the writer for longer than a single index lookup.
pub struct TickLog {
    name: String,
    capacity: usize,
    inner: RwLock<LogEntries>,
    groups: DashMap<String, Arc<GroupOffset>>,
    head_tx: watch::Sender<u64>,
    closed: AtomicBool,
    evicted: AtomicU64,
}

impl TickLog {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (head_tx, _) = watch::channel(0);
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            inner: RwLock::new(LogEntries {
                entries: VecDeque::with_capacity(capacity.clamp(1, 4_096)),
                next_seq: 1,
            }),
            groups: DashMap::new(),
            head_tx,
            closed: AtomicBool::new(false),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence id the next appended tick will receive
    pub fn next_sequence(&self) -> SequenceId {
        SequenceId(self.inner.read().next_seq)
    }

    /// Ticks evicted with no consumer group attached
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Append a tick, assigning the next sequence id
    pub fn append(&self, tick: MarketTick) -> Result<SequenceId, IngestError> {
        if self.is_closed() {
            return Err(IngestError::Closed {
                stream: self.name.clone(),
            });
        }

        let sequence = {
            let mut inner = self.inner.write();
            if inner.entries.len() >= self.capacity {
                self.trim_locked(&mut inner);
            }
            if inner.entries.len() >= self.capacity {
                if self.groups.is_empty() {
                    inner.entries.pop_front();
                    self.evicted.fetch_add(1, Ordering::Relaxed);
                } else {
                    return Err(IngestError::Backpressure {
                        stream: self.name.clone(),
                        capacity: self.capacity,
                    });
                }
            }

            let sequence = SequenceId(inner.next_seq);
            inner.next_seq += 1;
            inner.entries.push_back(SequencedTick {
                sequence,
                tick: Arc::new(tick),
            });
            sequence
        };

        self.head_tx.send_replace(sequence.value());
        Ok(sequence)
    }

    /// Attach to (or create) a consumer group.
    ///
    /// A new group starts at the oldest retained tick; an existing group
    /// resumes from its committed offset.
    pub fn consumer(self: &Arc<Self>, group: &str) -> GroupConsumer {
        let offset = {
            let inner = self.inner.read();
            let start = inner.first_seq();
            Arc::clone(
                self.groups
                    .entry(group.to_string())
                    .or_insert_with(|| {
                        debug!(stream = %self.name, group, start, "Created consumer group");
                        Arc::new(GroupOffset {
                            committed: AtomicU64::new(start),
                        })
                    })
                    .value(),
            )
        };

        let cursor = offset.committed.load(Ordering::Acquire);
        GroupConsumer {
            log: Arc::clone(self),
            group: group.to_string(),
            offset,
            cursor,
            head_rx: self.head_tx.subscribe(),
            skipped: 0,
        }
    }

    /// Remove a consumer group so it no longer holds back trimming
    pub fn drop_group(&self, group: &str) -> bool {
        self.groups.remove(group).is_some()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.key().clone()).collect()
    }

    /// Committed offset of a group, if it exists
    pub fn committed_offset(&self, group: &str) -> Option<SequenceId> {
        self.groups
            .get(group)
            .map(|g| SequenceId(g.committed.load(Ordering::Acquire)))
    }

    /// Ticks appended but not yet committed by `group`
    pub fn group_lag(&self, group: &str) -> Option<u64> {
        let committed = self.committed_offset(group)?.value();
        Some(self.next_sequence().value().saturating_sub(committed))
    }

    /// Drop entries every consumer group has committed past
    pub fn trim(&self) -> usize {
        let mut inner = self.inner.write();
        self.trim_locked(&mut inner)
    }

    fn trim_locked(&self, inner: &mut LogEntries) -> usize {
        let Some(min_committed) = self
            .groups
            .iter()
            .map(|g| g.committed.load(Ordering::Acquire))
            .min()
        else {
            return 0;
        };

        let mut removed = 0;
        while let Some(front) = inner.entries.front() {
            if front.sequence.value() >= min_committed {
                break;
            }
            inner.entries.pop_front();
            removed += 1;
        }
        removed
    }

    /// Refuse further appends and wake every waiting consumer.
    ///
    /// Consumers still drain the ticks already in the log.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(stream = %self.name, "Tick log closed");
            self.head_tx.send_modify(|_| {});
        }
    }

    fn read_at(&self, seq: u64) -> Option<(SequencedTick, u64)> {
        let inner = self.inner.read();
        if seq >= inner.next_seq {
            return None;
        }
        let first = inner.first_seq();
        let (index, skipped) = if seq < first {
            (0, first - seq)
        } else {
            ((seq - first) as usize, 0)
        };
        inner.entries.get(index).map(|e| (e.clone(), skipped))
    }
}

/// One reader's private cursor inside a consumer group
pub struct GroupConsumer {
    log: Arc<TickLog>,
    group: String,
    offset: Arc<GroupOffset>,
    cursor: u64,
    head_rx: watch::Receiver<u64>,
    skipped: u64,
}

impl GroupConsumer {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn stream(&self) -> &str {
        self.log.name()
    }

    /// Next sequence this consumer will read
    pub fn position(&self) -> SequenceId {
        SequenceId(self.cursor)
    }

    /// Ticks this consumer never saw because they were evicted first
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Non-blocking read of the next tick
    pub fn try_next(&mut self) -> Option<SequencedTick> {
        let (entry, skipped) = self.log.read_at(self.cursor)?;
        if skipped > 0 {
            warn!(
                stream = %self.log.name(),
                group = %self.group,
                skipped,
                "Consumer fell behind evicted ticks"
            );
            self.skipped += skipped;
        }
        self.cursor = entry.sequence.value() + 1;
        Some(entry)
    }

    /// Wait for the next tick. Returns `None` once the log is closed and
    /// drained.
    ///
    /// Cancel-safe: dropping the future never consumes a tick.
    pub async fn next(&mut self) -> Option<SequencedTick> {
        loop {
            if let Some(entry) = self.try_next() {
                return Some(entry);
            }
            if self.log.is_closed() {
                return None;
            }
            if self.head_rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Commit everything read so far
    pub fn commit(&self) -> SequenceId {
        self.commit_through(SequenceId(self.cursor.saturating_sub(1)))
    }

    /// Commit up to and including `sequence`. Offsets never move backwards.
    pub fn commit_through(&self, sequence: SequenceId) -> SequenceId {
        let next = sequence.value() + 1;
        let previous = self.offset.committed.fetch_max(next, Ordering::AcqRel);
        SequenceId(previous.max(next))
    }

    pub fn committed(&self) -> SequenceId {
        SequenceId(self.offset.committed.load(Ordering::Acquire))
    }
}
