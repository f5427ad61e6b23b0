//! In-process message bus.
//!
//! # Purpose
//! Backs tests, demos, and single-process deployments with the same
//! [`MessageBus`] contract a networked transport provides: broadcast
//! fan-out per channel plus competing-consumer queue groups.
//!
//! # Design notes
//! Fan-out rides on `tokio::sync::broadcast`; a forwarder task bridges
//! each subscriber onto a bounded mpsc stream so every subscription has
//! the same shape regardless of transport. Queue groups hold their
//! members behind a mutex and pick the next one round-robin.
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;

use crate::{BusError, MessageBus, RawSubscription, Result};

const DEFAULT_FANOUT_CAPACITY: usize = 1024;

/// In-process bus for pub/sub messaging.
///
/// ```
/// use bytes::Bytes;
/// use lariat_bus::{LocalBus, MessageBus};
///
/// let bus = LocalBus::new();
/// let rt = tokio::runtime::Runtime::new().expect("rt");
/// rt.block_on(async {
///     let mut sub = bus.subscribe("updates", 8).await.expect("subscribe");
///     bus.publish("updates", Bytes::from_static(b"payload"))
///         .await
///         .expect("publish");
///     let frame = sub.recv().await.expect("recv");
///     assert_eq!(frame, Bytes::from_static(b"payload"));
/// });
/// ```
pub struct LocalBus {
    // Map of channel -> broadcast sender feeding fan-out subscribers.
    topics: RwLock<HashMap<String, broadcast::Sender<Bytes>>>,
    // Map of channel -> queue group of competing consumers.
    queues: RwLock<HashMap<String, Arc<QueueGroup>>>,
    fanout_capacity: usize,
    closed: AtomicBool,
}

struct QueueGroup {
    members: Mutex<Vec<mpsc::Sender<Bytes>>>,
    next: AtomicUsize,
}

impl QueueGroup {
    fn new() -> Self {
        Self {
            members: Mutex::new(Vec::new()),
            next: AtomicUsize::new(0),
        }
    }

    fn join(&self, member: mpsc::Sender<Bytes>) {
        self.members.lock().expect("queue members lock").push(member);
    }

    // Deliver to exactly one live member, starting at the round-robin
    // cursor. A full member is skipped; if every member is full the frame
    // is dropped rather than blocking the publisher.
    fn deliver(&self, frame: Bytes) {
        let mut members = self.members.lock().expect("queue members lock");
        members.retain(|member| !member.is_closed());
        if members.is_empty() {
            return;
        }
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        for offset in 0..members.len() {
            let member = &members[(start + offset) % members.len()];
            if member.try_send(frame.clone()).is_ok() {
                return;
            }
        }
        metrics::counter!("lariat_bus_queue_dropped_total").increment(1);
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
            closed: AtomicBool::new(false),
        }
    }

    // Keep a single capacity value so new channels match existing ones.
    pub fn with_fanout_capacity(mut self, capacity: usize) -> Self {
        self.fanout_capacity = capacity.max(1);
        self
    }

    /// Stops accepting publishes and subscriptions. Existing streams end
    /// once their backlogs drain.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, channel: &str, frame: Bytes) -> Result<()> {
        self.check_open()?;

        // Fan-out to broadcast subscribers when the channel has any.
        let topic = self.topics.read().await.get(channel).cloned();
        if let Some(topic) = topic {
            // Zero receivers is not a failure; the channel just has no
            // fan-out subscribers right now.
            let _ = topic.send(frame.clone());
        }

        // Hand one copy to the channel's queue group, if present.
        let group = self.queues.read().await.get(channel).cloned();
        if let Some(group) = group {
            group.deliver(frame);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str, buffer: usize) -> Result<RawSubscription> {
        self.check_open()?;
        let topic = {
            let mut topics = self.topics.write().await;
            topics
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(self.fanout_capacity).0)
                .clone()
        };
        let mut source = topic.subscribe();
        let (tx, rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(frame) => {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "fan-out subscriber lagged");
                        metrics::counter!("lariat_bus_fanout_lagged_total").increment(skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(RawSubscription::new(rx))
    }

    async fn subscribe_queue(&self, channel: &str, buffer: usize) -> Result<RawSubscription> {
        self.check_open()?;
        let group = {
            let mut queues = self.queues.write().await;
            queues
                .entry(channel.to_string())
                .or_insert_with(|| Arc::new(QueueGroup::new()))
                .clone()
        };
        let (tx, rx) = mpsc::channel(buffer.max(1));
        group.join(tx);
        Ok(RawSubscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_reaches_every_subscriber() {
        let bus = LocalBus::new();
        let mut first = bus.subscribe("events", 8).await.expect("subscribe");
        let mut second = bus.subscribe("events", 8).await.expect("subscribe");
        bus.publish("events", Bytes::from_static(b"both"))
            .await
            .expect("publish");
        assert_eq!(first.recv().await.expect("recv"), Bytes::from_static(b"both"));
        assert_eq!(second.recv().await.expect("recv"), Bytes::from_static(b"both"));
    }

    #[tokio::test]
    async fn queue_group_delivers_to_one_member() {
        let bus = LocalBus::new();
        let mut first = bus.subscribe_queue("work", 8).await.expect("subscribe");
        let mut second = bus.subscribe_queue("work", 8).await.expect("subscribe");
        for _ in 0..4 {
            bus.publish("work", Bytes::from_static(b"job"))
                .await
                .expect("publish");
        }

        // Round-robin: each member sees exactly half the jobs.
        let mut first_count = 0;
        let mut second_count = 0;
        for _ in 0..2 {
            first.recv().await.expect("first recv");
            first_count += 1;
        }
        for _ in 0..2 {
            second.recv().await.expect("second recv");
            second_count += 1;
        }
        assert_eq!(first_count + second_count, 4);
    }

    #[tokio::test]
    async fn queue_group_skips_dropped_members() {
        let bus = LocalBus::new();
        let first = bus.subscribe_queue("work", 8).await.expect("subscribe");
        let mut second = bus.subscribe_queue("work", 8).await.expect("subscribe");
        drop(first);
        for _ in 0..3 {
            bus.publish("work", Bytes::from_static(b"job"))
                .await
                .expect("publish");
        }
        for _ in 0..3 {
            second.recv().await.expect("surviving member recv");
        }
    }

    #[tokio::test]
    async fn publish_after_close_fails() {
        let bus = LocalBus::new();
        bus.close();
        let err = bus
            .publish("events", Bytes::from_static(b"late"))
            .await
            .expect_err("closed");
        assert!(matches!(err, BusError::Closed));
        assert!(bus.subscribe("events", 8).await.is_err());
    }

    #[tokio::test]
    async fn dropped_subscription_ends_forwarder() {
        let bus = LocalBus::new();
        let sub = bus.subscribe("events", 1).await.expect("subscribe");
        drop(sub);
        // Publishing after the only subscriber left must not error.
        bus.publish("events", Bytes::from_static(b"noone"))
            .await
            .expect("publish");
    }
}
