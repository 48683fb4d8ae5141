//! Integration tests for the fact consumer's delivery contract:
//! happy-path dispatch, bounded retry, dead-letter routing, and survival
//! past a poisoned envelope.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tablehop_core::bus::publish_fact;
use tablehop_core::envelope::FactEnvelope;
use tablehop_core::fact::{GuestCreated, GuestId, topics};
use tablehop_runtime::{FactConsumer, FactHandler, HandlerError, RetryPolicy};
use tablehop_testing::InMemoryFactBus;
use tablehop_testing::handlers::{FailingHandler, RecordingHandler};
use tokio::sync::broadcast;

fn guest_created(id: i64) -> GuestCreated {
    GuestCreated {
        id: GuestId(id),
        name: format!("guest-{id}"),
        email: format!("guest-{id}@example.com"),
    }
}

async fn wait_for_dead_letters(bus: &InMemoryFactBus, topic: &str, count: usize) -> Vec<FactEnvelope> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let dead = bus.published(topic).await;
            if dead.len() >= count {
                return dead;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for dead letters")
}

#[tokio::test]
async fn successful_handlers_commit_without_dead_letters() {
    let bus = Arc::new(InMemoryFactBus::new());
    let handler = Arc::new(RecordingHandler::new());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let task = FactConsumer::new(
        "recording",
        vec![topics::GUEST_CREATED.to_string()],
        "test-group",
        bus.clone(),
        handler.clone(),
        shutdown_rx,
    )
    .spawn();

    publish_fact(bus.as_ref(), &guest_created(1))
        .await
        .expect("publish should succeed");

    tokio::time::timeout(Duration::from_secs(2), handler.wait_for(1))
        .await
        .expect("handler should see the fact");

    let seen = handler.seen().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_type, "GuestCreated.v1");
    assert!(
        bus.published("guest-created.DLT").await.is_empty(),
        "no dead letters on success"
    );

    drop(shutdown_tx.send(()));
    task.await.expect("consumer task should stop cleanly");
}

#[tokio::test]
async fn a_failing_handler_is_invoked_three_times_then_dead_lettered() {
    let bus = Arc::new(InMemoryFactBus::new());
    let handler = Arc::new(FailingHandler::new());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let task = FactConsumer::new(
        "failing",
        vec![topics::GUEST_CREATED.to_string()],
        "test-group",
        bus.clone(),
        handler.clone(),
        shutdown_rx,
    )
    .with_retry_policy(RetryPolicy::immediate(3))
    .spawn();

    let fact = guest_created(2);
    publish_fact(bus.as_ref(), &fact).await.expect("publish should succeed");

    let dead = wait_for_dead_letters(&bus, "guest-created.DLT", 1).await;

    assert_eq!(handler.attempts(), 3, "exactly three invocations before DLT");
    assert_eq!(dead.len(), 1);

    // Original payload travels intact; failure metadata rides alongside.
    let original: GuestCreated = serde_json::from_str(&dead[0].payload).expect("payload intact");
    assert_eq!(original, fact);
    assert_eq!(dead[0].event_type, "GuestCreated.v1");
    let metadata = dead[0].metadata.as_ref().expect("failure metadata recorded");
    assert_eq!(metadata["attempts"], 3);
    assert_eq!(metadata["source_topic"], "guest-created");

    drop(shutdown_tx.send(()));
    task.await.expect("consumer task should stop cleanly");
}

/// Fails only for one poisoned guest id; records everything else.
struct SelectiveHandler {
    poison: i64,
    recorder: RecordingHandler,
}

#[async_trait]
impl FactHandler for SelectiveHandler {
    async fn handle(&self, envelope: &FactEnvelope) -> Result<(), HandlerError> {
        let fact: GuestCreated = envelope.decode()?;
        if fact.id.0 == self.poison {
            return Err("poisoned guest".into());
        }
        self.recorder.handle(envelope).await
    }
}

#[tokio::test]
async fn consumption_continues_after_a_dead_letter() {
    let bus = Arc::new(InMemoryFactBus::new());
    let handler = Arc::new(SelectiveHandler {
        poison: 13,
        recorder: RecordingHandler::new(),
    });
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let task = FactConsumer::new(
        "selective",
        vec![topics::GUEST_CREATED.to_string()],
        "test-group",
        bus.clone(),
        handler.clone(),
        shutdown_rx,
    )
    .with_retry_policy(RetryPolicy::immediate(3))
    .spawn();

    publish_fact(bus.as_ref(), &guest_created(13))
        .await
        .expect("publish should succeed");
    publish_fact(bus.as_ref(), &guest_created(14))
        .await
        .expect("publish should succeed");

    tokio::time::timeout(Duration::from_secs(2), handler.recorder.wait_for(1))
        .await
        .expect("healthy fact should still be processed");
    let dead = wait_for_dead_letters(&bus, "guest-created.DLT", 1).await;
    assert_eq!(dead.len(), 1);

    let survivors = handler.recorder.seen().await;
    assert_eq!(survivors.len(), 1);
    let fact: GuestCreated = survivors[0].decode().expect("decodable");
    assert_eq!(fact.id, GuestId(14));

    drop(shutdown_tx.send(()));
    task.await.expect("consumer task should stop cleanly");
}
