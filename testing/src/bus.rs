//! In-memory event bus with partitions and consumer groups.
//!
//! Implements the same delivery contract as the production bus so the
//! services can be exercised end to end inside one process:
//!
//! - **Partitioned**: a fact's partition is derived from its partition key,
//!   so facts sharing a key land on the same partition and are delivered to
//!   a group in publish order. Facts without a key are spread round-robin.
//! - **Consumer groups**: every group receives its own copy of each fact;
//!   within a group, each partition is owned by exactly one member
//!   (`partition % member_count`).
//! - **At-least-once**: a member joining a group replays its assigned
//!   partitions from the beginning of the topic log, mirroring the
//!   redelivery a broker rebalance produces. Consumers must be idempotent.
//!
//! The full topic log is retained and exposed via
//! [`InMemoryFactBus::published`] so tests can assert on publish order and
//! dead-letter contents without subscribing.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use tablehop_core::bus::{EventBus, EventBusError, FactStream};
use tablehop_core::envelope::FactEnvelope;
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

type Delivery = Result<FactEnvelope, EventBusError>;

struct GroupState {
    members: Vec<mpsc::UnboundedSender<Delivery>>,
}

struct TopicState {
    partition_count: usize,
    /// Append-only log of (partition, envelope) in publish order.
    log: Vec<(usize, FactEnvelope)>,
    groups: HashMap<String, GroupState>,
    /// Round-robin cursor for keyless facts.
    next_partition: usize,
}

impl TopicState {
    fn new(partition_count: usize) -> Self {
        Self {
            partition_count,
            log: Vec::new(),
            groups: HashMap::new(),
            next_partition: 0,
        }
    }

    fn partition_for(&mut self, key: Option<&str>) -> usize {
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() as usize) % self.partition_count
            }
            None => {
                let partition = self.next_partition % self.partition_count;
                self.next_partition = self.next_partition.wrapping_add(1);
                partition
            }
        }
    }
}

/// Partitioned, consumer-group-aware in-memory event bus.
///
/// # Example
///
/// ```rust,ignore
/// let bus = Arc::new(InMemoryFactBus::new());
/// publish_fact(bus.as_ref(), &GuestCreated { .. }).await?;
///
/// let mut stream = bus.subscribe(&["guest-created"], "notification-service").await?;
/// let envelope = stream.next().await;
/// ```
pub struct InMemoryFactBus {
    partition_count: usize,
    topics: Mutex<HashMap<String, TopicState>>,
}

impl Default for InMemoryFactBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFactBus {
    /// Create a bus with the default partition count (4).
    #[must_use]
    pub fn new() -> Self {
        Self::with_partitions(4)
    }

    /// Create a bus with an explicit partition count per topic.
    ///
    /// # Panics
    ///
    /// Panics if `partition_count` is 0.
    #[must_use]
    pub fn with_partitions(partition_count: usize) -> Self {
        assert!(partition_count > 0, "partition_count must be greater than 0");
        Self {
            partition_count,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of every envelope published to `topic`, in publish order.
    pub async fn published(&self, topic: &str) -> Vec<FactEnvelope> {
        let topics = self.topics.lock().await;
        topics
            .get(topic)
            .map(|state| state.log.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }
}

impl EventBus for InMemoryFactBus {
    fn publish(
        &self,
        topic: &str,
        envelope: &FactEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let envelope = envelope.clone();

        Box::pin(async move {
            let mut topics = self.topics.lock().await;
            let state = topics
                .entry(topic.clone())
                .or_insert_with(|| TopicState::new(self.partition_count));

            let partition = state.partition_for(envelope.partition_key.as_deref());
            state.log.push((partition, envelope.clone()));

            trace!(
                topic = %topic,
                partition,
                event_type = %envelope.event_type,
                "fact published"
            );

            for group in state.groups.values() {
                if group.members.is_empty() {
                    continue;
                }
                let member = partition % group.members.len();
                // A dropped receiver just means that member went away; the
                // log still holds the fact for future group members.
                let _ = group.members[member].send(Ok(envelope.clone()));
            }

            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
        group: &str,
    ) -> Pin<Box<dyn Future<Output = Result<FactStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let group = group.to_string();

        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel::<Delivery>();

            {
                let mut all = self.topics.lock().await;
                for topic in &topics {
                    let state = all
                        .entry(topic.clone())
                        .or_insert_with(|| TopicState::new(self.partition_count));

                    let group_state = state
                        .groups
                        .entry(group.clone())
                        .or_insert_with(|| GroupState { members: Vec::new() });

                    group_state.members.push(tx.clone());
                    let member_index = group_state.members.len() - 1;
                    let member_count = group_state.members.len();

                    // Replay assigned partitions from the start of the log.
                    // Earlier members may already have processed some of these
                    // facts; duplicates are part of the contract.
                    for (partition, envelope) in &state.log {
                        if partition % member_count == member_index {
                            let _ = tx.send(Ok(envelope.clone()));
                        }
                    }

                    trace!(
                        topic = %topic,
                        group = %group,
                        member_index,
                        "group member subscribed"
                    );
                }
            }

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };

            Ok(Box::pin(stream) as FactStream)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tablehop_core::bus::publish_fact;
    use tablehop_core::fact::{GuestCreated, GuestId};

    fn guest_created(id: i64) -> GuestCreated {
        GuestCreated {
            id: GuestId(id),
            name: format!("guest-{id}"),
            email: format!("guest-{id}@example.com"),
        }
    }

    fn keyed_envelope(topic: &str, key: &str, seq: usize) -> FactEnvelope {
        FactEnvelope {
            topic: topic.to_string(),
            event_type: "Test.v1".to_string(),
            payload: format!("{{\"seq\":{seq}}}"),
            partition_key: Some(key.to_string()),
            correlation_id: format!("{topic}-{key}"),
            occurred_at: chrono::Utc::now(),
            metadata: None,
        }
    }

    async fn collect(stream: &mut FactStream, n: usize) -> Vec<FactEnvelope> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let item = tokio::time::timeout(Duration::from_secs(1), stream.next())
                .await
                .expect("timed out waiting for fact")
                .expect("stream ended early")
                .expect("stream yielded an error");
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn facts_sharing_a_key_arrive_in_publish_order() {
        let bus = InMemoryFactBus::new();
        let mut stream = bus
            .subscribe(&["orders"], "group-a")
            .await
            .expect("subscribe should succeed");

        for seq in 0..5 {
            let env = keyed_envelope("orders", "key-1", seq);
            bus.publish("orders", &env).await.expect("publish should succeed");
        }
        // A second key interleaved with the first.
        for seq in 5..8 {
            let env = keyed_envelope("orders", "key-2", seq);
            bus.publish("orders", &env).await.expect("publish should succeed");
        }

        let received = collect(&mut stream, 8).await;
        let key1: Vec<&str> = received
            .iter()
            .filter(|e| e.partition_key.as_deref() == Some("key-1"))
            .map(|e| e.payload.as_str())
            .collect();
        assert_eq!(
            key1,
            vec![
                "{\"seq\":0}",
                "{\"seq\":1}",
                "{\"seq\":2}",
                "{\"seq\":3}",
                "{\"seq\":4}"
            ]
        );
    }

    #[tokio::test]
    async fn each_group_receives_its_own_copy() {
        let bus = Arc::new(InMemoryFactBus::new());
        let mut reservations = bus
            .subscribe(&["guest-created"], "reservation-service")
            .await
            .expect("subscribe should succeed");
        let mut notifications = bus
            .subscribe(&["guest-created"], "notification-service")
            .await
            .expect("subscribe should succeed");

        publish_fact(bus.as_ref(), &guest_created(1))
            .await
            .expect("publish should succeed");

        let a = collect(&mut reservations, 1).await;
        let b = collect(&mut notifications, 1).await;
        assert_eq!(a[0].payload, b[0].payload);
    }

    #[tokio::test]
    async fn group_members_split_the_partitions() {
        let bus = Arc::new(InMemoryFactBus::with_partitions(8));
        let mut member_a = bus
            .subscribe(&["guest-created"], "notification-service")
            .await
            .expect("subscribe should succeed");
        let mut member_b = bus
            .subscribe(&["guest-created"], "notification-service")
            .await
            .expect("subscribe should succeed");

        for id in 0..32 {
            publish_fact(bus.as_ref(), &guest_created(id))
                .await
                .expect("publish should succeed");
        }

        // Drain both members; together they must see every fact exactly once
        // (no rebalance happened after subscription, so no duplicates here).
        let mut seen = Vec::new();
        loop {
            tokio::select! {
                Some(Ok(env)) = member_a.next() => seen.push(env),
                Some(Ok(env)) = member_b.next() => seen.push(env),
                () = tokio::time::sleep(Duration::from_millis(100)) => break,
            }
        }
        assert_eq!(seen.len(), 32);
    }

    #[tokio::test]
    async fn a_new_group_replays_the_topic_from_the_beginning() {
        let bus = Arc::new(InMemoryFactBus::new());
        publish_fact(bus.as_ref(), &guest_created(1))
            .await
            .expect("publish should succeed");
        publish_fact(bus.as_ref(), &guest_created(2))
            .await
            .expect("publish should succeed");

        let mut late = bus
            .subscribe(&["guest-created"], "late-group")
            .await
            .expect("subscribe should succeed");
        let received = collect(&mut late, 2).await;
        assert_eq!(received.len(), 2);
    }

    #[tokio::test]
    async fn published_exposes_the_log_in_publish_order() {
        let bus = InMemoryFactBus::new();
        for seq in 0..3 {
            let env = keyed_envelope("audit", "k", seq);
            bus.publish("audit", &env).await.expect("publish should succeed");
        }
        let log = bus.published("audit").await;
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].payload, "{\"seq\":0}");
        assert_eq!(log[2].payload, "{\"seq\":2}");
        assert!(bus.published("unknown").await.is_empty());
    }
}
