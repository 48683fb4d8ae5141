//! Generic fact consumer with retry, dead-letter routing and reconnection.
//!
//! One `FactConsumer` is spawned per (service, topic set, consumer group).
//! It owns the subscribe/process/reconnect loop so the services only
//! implement [`FactHandler`] and never touch stream plumbing.
//!
//! ```text
//! loop {
//!     subscribe(topics, group)
//!     for each envelope {
//!         attempt handler up to max_attempts
//!         exhausted -> publish to <topic>.DLT, continue
//!     }
//!     stream ended -> wait, resubscribe
//! }
//! ```

use crate::handler::{FactHandler, HandlerError};
use crate::retry::RetryPolicy;
use chrono::Utc;
use futures::StreamExt;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tablehop_core::bus::{EventBus, FactStream};
use tablehop_core::envelope::FactEnvelope;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Drives a [`FactHandler`] against a bus subscription.
///
/// # Lifecycle
///
/// 1. Created via [`FactConsumer::new`]
/// 2. Spawned as a background task via [`FactConsumer::spawn`]
/// 3. Runs until the shutdown broadcast fires
///
/// # Failure Semantics
///
/// - Handler errors are retried per the [`RetryPolicy`], then dead-lettered;
///   the consumer always moves on to the next envelope.
/// - Stream errors (transport hiccups, undecodable messages) are logged and
///   skipped; they carry no envelope to retry.
/// - A closed stream or failed subscription triggers reconnection after a
///   delay.
pub struct FactConsumer {
    /// Consumer name, used in logs and metric labels.
    name: String,
    /// Topics to subscribe to.
    topics: Vec<String>,
    /// Consumer group this instance joins.
    group: String,
    /// Bus to consume from and to dead-letter into.
    bus: Arc<dyn EventBus>,
    /// Handler invoked for each envelope.
    handler: Arc<dyn FactHandler>,
    /// Shutdown signal receiver.
    shutdown: broadcast::Receiver<()>,
    /// Retry policy applied around the handler.
    retry: RetryPolicy,
    /// Delay before resubscribing after a failure or stream end.
    reconnect_delay: Duration,
}

impl FactConsumer {
    /// Create a new consumer with the default retry policy.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topics: Vec<String>,
        group: impl Into<String>,
        bus: Arc<dyn EventBus>,
        handler: Arc<dyn FactHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            topics,
            group: group.into(),
            bus,
            handler,
            shutdown,
            retry: RetryPolicy::default(),
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the reconnect delay (default: 5 seconds).
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Spawn the consumer as a background task.
    ///
    /// The task runs until a shutdown signal is received.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(consumer = %self.name, group = %self.group, "fact consumer started");

        loop {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "fact consumer received shutdown signal");
                    break;
                }
                subscribe_result = self.bus.subscribe(&topics, &self.group) => {
                    match subscribe_result {
                        Ok(mut stream) => {
                            info!(consumer = %self.name, topics = ?self.topics, "subscribed to event bus");

                            if self.process_stream(&mut stream).await {
                                break;
                            }

                            warn!(
                                consumer = %self.name,
                                "fact stream ended, resubscribing in {:?}",
                                self.reconnect_delay
                            );
                            tokio::time::sleep(self.reconnect_delay).await;
                        }
                        Err(e) => {
                            error!(
                                consumer = %self.name,
                                error = %e,
                                "failed to subscribe, retrying in {:?}",
                                self.reconnect_delay
                            );
                            tokio::time::sleep(self.reconnect_delay).await;
                        }
                    }
                }
            }
        }

        info!(consumer = %self.name, "fact consumer stopped");
    }

    /// Process envelopes until the stream ends or shutdown fires.
    ///
    /// Returns `true` when shutdown was requested.
    async fn process_stream(&mut self, stream: &mut FactStream) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "shutdown received during processing");
                    return true;
                }
                item = stream.next() => {
                    match item {
                        Some(Ok(envelope)) => {
                            Self::dispatch(&self.name, &self.bus, &self.handler, &self.retry, envelope)
                                .await;
                        }
                        Some(Err(e)) => {
                            error!(consumer = %self.name, error = %e, "error receiving fact from stream");
                        }
                        None => return false,
                    }
                }
            }
        }
    }

    /// Run one envelope through the handler with bounded retry.
    async fn dispatch(
        name: &str,
        bus: &Arc<dyn EventBus>,
        handler: &Arc<dyn FactHandler>,
        retry: &RetryPolicy,
        envelope: FactEnvelope,
    ) {
        counter!("tablehop_facts_consumed_total", "consumer" => name.to_string()).increment(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match handler.handle(&envelope).await {
                Ok(()) => return,
                Err(error) => {
                    warn!(
                        consumer = %name,
                        event_type = %envelope.event_type,
                        correlation_id = %envelope.correlation_id,
                        attempt,
                        error = %error,
                        "handler failed"
                    );

                    if attempt >= retry.max_attempts {
                        Self::dead_letter(name, bus, envelope, &error, attempt).await;
                        return;
                    }

                    counter!("tablehop_fact_retries_total", "consumer" => name.to_string())
                        .increment(1);
                    tokio::time::sleep(retry.backoff).await;
                }
            }
        }
    }

    /// Re-publish an exhausted envelope to the paired dead-letter topic.
    async fn dead_letter(
        name: &str,
        bus: &Arc<dyn EventBus>,
        envelope: FactEnvelope,
        error: &HandlerError,
        attempts: usize,
    ) {
        let dead = envelope.into_dead_letter(&error.to_string(), attempts, Utc::now());
        match bus.publish(&dead.topic, &dead).await {
            Ok(()) => {
                counter!("tablehop_facts_dead_lettered_total", "consumer" => name.to_string())
                    .increment(1);
                error!(
                    consumer = %name,
                    topic = %dead.topic,
                    event_type = %dead.event_type,
                    attempts,
                    "fact dead-lettered after exhausting retries"
                );
            }
            Err(publish_error) => {
                // The fact is lost to automation at this point; the log line
                // is the only remaining trail.
                error!(
                    consumer = %name,
                    topic = %dead.topic,
                    error = %publish_error,
                    "failed to publish dead letter"
                );
            }
        }
    }
}
