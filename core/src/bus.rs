//! Event bus abstraction for cross-service communication.
//!
//! Facts flow from the service that owns an aggregate, through the bus, to
//! every consumer group that subscribed to the topic. The bus is the only
//! coordination mechanism between services; there is no shared database.
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: a fact may be delivered more than once
//! - **Idempotency**: subscribers must handle duplicate facts
//! - **Ordered within a partition key**: facts sharing a key reach a group
//!   in publish order; nothing is guaranteed across keys
//! - **Consumer groups**: each fact is delivered to exactly one member of
//!   each subscribed group
//!
//! # Implementations
//!
//! - `InMemoryFactBus` (tablehop-testing) - partitioned in-process bus for
//!   tests and single-process wiring
//! - `RedpandaFactBus` (tablehop-redpanda) - Kafka-compatible production bus
//!
//! Retry and dead-letter routing are not the transport's job: the
//! `FactConsumer` in tablehop-runtime drives a handler against the stream
//! returned by [`EventBus::subscribe`] and re-publishes exhausted failures
//! to `<topic>.DLT`.

use crate::envelope::FactEnvelope;
use crate::fact::Fact;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a fact to a topic.
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to subscribe to topics.
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe.
        topics: Vec<String>,
        /// The reason for failure.
        reason: String,
    },

    /// A received message could not be turned into a fact envelope.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error.
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of fact envelopes from a subscription.
pub type FactStream = Pin<Box<dyn Stream<Item = Result<FactEnvelope, EventBusError>> + Send>>;

/// Name of the dead-letter topic paired with `topic`.
#[must_use]
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}.DLT")
}

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; services hold the bus behind an
/// `Arc<dyn EventBus>` and publish from request handlers and background
/// consumers concurrently.
///
/// # Dyn Compatibility
///
/// Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
/// the trait stays object safe.
pub trait EventBus: Send + Sync {
    /// Publish a fact envelope to a topic.
    ///
    /// Delivery is at-least-once; the implementation may buffer before
    /// transmission. How a failed publish is handled (propagated, logged and
    /// absorbed) is the caller's decision per operation.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish(
        &self,
        topic: &str,
        envelope: &FactEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe a consumer group to one or more topics.
    ///
    /// Each fact published to a subscribed topic is delivered at least once
    /// to exactly one member of the group. Facts sharing a partition key
    /// arrive in publish order.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription
    /// cannot be established.
    fn subscribe(
        &self,
        topics: &[&str],
        group: &str,
    ) -> Pin<Box<dyn Future<Output = Result<FactStream, EventBusError>> + Send + '_>>;
}

/// Wrap a fact in an envelope and publish it to its topic.
///
/// Convenience used by the services after a successful repository commit.
///
/// # Errors
///
/// Returns [`EventBusError::PublishFailed`] if encoding or transport fails.
pub async fn publish_fact<F: Fact>(bus: &dyn EventBus, fact: &F) -> Result<(), EventBusError> {
    let envelope = FactEnvelope::from_fact(fact).map_err(|e| EventBusError::PublishFailed {
        topic: F::TOPIC.to_string(),
        reason: e.to_string(),
    })?;
    bus.publish(F::TOPIC, &envelope).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_topics_share_the_original_name() {
        assert_eq!(dead_letter_topic("reservation-created"), "reservation-created.DLT");
    }
}
