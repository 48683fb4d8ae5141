//! Redpanda event bus implementation for Tablehop.
//!
//! This crate provides a production-ready Redpanda-based event bus that
//! implements the [`EventBus`] trait from `tablehop-core`. It uses rdkafka
//! for Kafka-compatible event streaming, so any Kafka-protocol broker
//! (Redpanda, Apache Kafka, MSK, Event Hubs) works unchanged.
//!
//! # Wire Format
//!
//! A [`FactEnvelope`] maps onto a Kafka record as:
//!
//! - **payload**: the fact body as self-describing JSON text
//! - **key**: the envelope's partition key, so facts sharing a key share a
//!   partition and keep their publish order
//! - **headers**: `event-type`, `correlation-id`, `occurred-at` and, for
//!   dead letters, a JSON `metadata` header with the failure details
//!
//! # Delivery Semantics
//!
//! **At-least-once** with manual offset commits:
//! - Offsets are committed AFTER successful delivery to the subscriber's
//!   channel; a crash before commit redelivers the fact
//! - Subscribers must be idempotent
//! - Ordering is guaranteed within a partition (same partition key)
//!
//! # Example
//!
//! ```no_run
//! use tablehop_redpanda::RedpandaFactBus;
//! use tablehop_core::bus::EventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaFactBus::new("localhost:9092")?;
//!
//! let mut stream = bus
//!     .subscribe(&["reservation-created"], "notification-service")
//!     .await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(envelope) => println!("received {}", envelope.event_type),
//!         Err(e) => eprintln!("stream error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tablehop_core::bus::{EventBus, EventBusError, FactStream};
use tablehop_core::envelope::FactEnvelope;

/// Redpanda event bus implementation.
///
/// # Configuration
///
/// - **Broker addresses**: bootstrap servers (required)
/// - **Producer settings**: acks, compression, timeout
/// - **Buffer size**: subscriber channel capacity (default: 1000)
/// - **Offset reset**: where new groups start reading (default: "latest")
///
/// Consumer groups are chosen per [`EventBus::subscribe`] call; each service
/// passes its own group id.
pub struct RedpandaFactBus {
    /// Kafka producer for publishing envelopes.
    producer: FutureProducer,
    /// Broker addresses (for creating consumers).
    brokers: String,
    /// Producer send timeout.
    timeout: Duration,
    /// Envelope buffer size for subscribers.
    buffer_size: usize,
    /// Auto offset reset policy.
    auto_offset_reset: String,
}

impl RedpandaFactBus {
    /// Create a new bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created from the given broker list.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the bus.
    #[must_use]
    pub fn builder() -> RedpandaFactBusBuilder {
        RedpandaFactBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn envelope_headers(envelope: &FactEnvelope) -> OwnedHeaders {
        let mut headers = OwnedHeaders::new()
            .insert(Header {
                key: "event-type",
                value: Some(envelope.event_type.as_bytes()),
            })
            .insert(Header {
                key: "correlation-id",
                value: Some(envelope.correlation_id.as_bytes()),
            })
            .insert(Header {
                key: "occurred-at",
                value: Some(envelope.occurred_at.to_rfc3339().as_bytes()),
            });
        if let Some(metadata) = &envelope.metadata {
            headers = headers.insert(Header {
                key: "metadata",
                value: Some(metadata.to_string().as_bytes()),
            });
        }
        headers
    }

    /// Rebuild a [`FactEnvelope`] from a consumed Kafka message.
    fn envelope_from_message(message: &BorrowedMessage<'_>) -> Result<FactEnvelope, EventBusError> {
        let payload = message
            .payload()
            .ok_or_else(|| EventBusError::DeserializationFailed("message has no payload".to_string()))?;
        let payload = std::str::from_utf8(payload)
            .map_err(|e| EventBusError::DeserializationFailed(format!("payload is not UTF-8: {e}")))?
            .to_string();

        let mut event_type = None;
        let mut correlation_id = None;
        let mut occurred_at = None;
        let mut metadata = None;
        if let Some(headers) = message.headers() {
            for header in headers.iter() {
                let Some(value) = header.value else { continue };
                let Ok(value) = std::str::from_utf8(value) else {
                    continue;
                };
                match header.key {
                    "event-type" => event_type = Some(value.to_string()),
                    "correlation-id" => correlation_id = Some(value.to_string()),
                    "occurred-at" => {
                        occurred_at = DateTime::parse_from_rfc3339(value)
                            .ok()
                            .map(|t| t.with_timezone(&Utc));
                    }
                    "metadata" => metadata = serde_json::from_str(value).ok(),
                    _ => {}
                }
            }
        }

        let event_type = event_type.ok_or_else(|| {
            EventBusError::DeserializationFailed("message has no event-type header".to_string())
        })?;
        let partition_key = message
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(ToString::to_string);

        Ok(FactEnvelope {
            topic: message.topic().to_string(),
            event_type,
            payload,
            partition_key,
            correlation_id: correlation_id.unwrap_or_default(),
            occurred_at: occurred_at.unwrap_or_else(Utc::now),
            metadata,
        })
    }
}

/// Builder for configuring a [`RedpandaFactBus`].
#[derive(Default)]
pub struct RedpandaFactBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaFactBusBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all" (default: "1").
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout (default: 5 seconds).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the envelope buffer size for subscriptions (default: 1000).
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is 0.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        assert!(buffer_size > 0, "buffer_size must be greater than 0");
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Set the auto offset reset policy for new consumer groups:
    /// `"earliest"`, `"latest"` (default) or `"error"`.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaFactBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaFactBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("1"))
            .set(
                "compression.type",
                self.compression.as_deref().unwrap_or("none"),
            );

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        tracing::info!(
            brokers = %brokers,
            acks = self.producer_acks.as_deref().unwrap_or("1"),
            compression = self.compression.as_deref().unwrap_or("none"),
            buffer_size = self.buffer_size.unwrap_or(1000),
            auto_offset_reset = self.auto_offset_reset.as_deref().unwrap_or("latest"),
            "RedpandaFactBus created successfully"
        );

        Ok(RedpandaFactBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            buffer_size: self.buffer_size.unwrap_or(1000),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "latest".to_string()),
        })
    }
}

impl EventBus for RedpandaFactBus {
    fn publish(
        &self,
        topic: &str,
        envelope: &FactEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let envelope = envelope.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let headers = Self::envelope_headers(&envelope);

            let mut record = FutureRecord::to(&topic)
                .payload(envelope.payload.as_bytes())
                .headers(headers);
            if let Some(key) = &envelope.partition_key {
                record = record.key(key.as_bytes());
            }

            let send_result = self.producer.send(record, Timeout::After(timeout)).await;

            match send_result {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        event_type = %envelope.event_type,
                        "fact published successfully"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        error = %kafka_error,
                        "failed to publish fact"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
        group: &str,
    ) -> Pin<Box<dyn Future<Output = Result<FactStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let group = group.to_string();
        let brokers = self.brokers.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            // Manual commit keeps delivery at-least-once: commit only after
            // the envelope reached the subscriber's channel.
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %group,
                buffer_size = buffer_size,
                auto_offset_reset = %auto_offset_reset,
                manual_commit = true,
                "subscribed to topics"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

            tokio::spawn(async move {
                use futures::StreamExt;
                use rdkafka::consumer::CommitMode;

                let mut stream = consumer.stream();

                while let Some(msg_result) = stream.next().await {
                    match msg_result {
                        Ok(message) => {
                            let envelope_result = RedpandaFactBus::envelope_from_message(&message);

                            // Only commit AFTER successful send to the channel;
                            // a crash before commit means redelivery.
                            if tx.send(envelope_result).await.is_err() {
                                tracing::debug!("channel receiver dropped, exiting consumer task");
                                break;
                            }

                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "failed to commit offset (message may be redelivered)"
                                );
                            }
                        }
                        Err(e) => {
                            let err = EventBusError::TransportError(format!(
                                "failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        }
                    }
                }

                tracing::debug!("consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as FactStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_fact_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaFactBus>();
        assert_sync::<RedpandaFactBus>();
    }

    #[test]
    fn builder_default_works() {
        let _builder = RedpandaFactBus::builder();
    }
}
