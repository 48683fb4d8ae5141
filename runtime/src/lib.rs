//! # Tablehop Runtime
//!
//! Consumer-side machinery shared by every Tablehop service.
//!
//! The event bus transports fact envelopes; this crate turns a transport
//! stream into the delivery contract the services rely on:
//!
//! - [`FactHandler`] - the trait a service implements to process facts
//! - [`FactConsumer`] - the subscribe/process/reconnect loop that drives a
//!   handler, retries failed deliveries a bounded number of times with a
//!   fixed backoff, and routes exhausted failures to `<topic>.DLT`
//! - [`RetryPolicy`] - the bounded, fixed-backoff retry configuration
//!
//! # Delivery Contract
//!
//! A handler error does not stop the consumer. The failing envelope is
//! retried up to [`RetryPolicy::max_attempts`] total invocations; after the
//! last failure the original payload, plus failure metadata, is published to
//! the paired dead-letter topic and the consumer moves on. Handlers must be
//! idempotent: restart or rebalance can replay uncommitted facts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod consumer;
mod handler;
pub mod metrics;
mod retry;

pub use consumer::FactConsumer;
pub use handler::{FactHandler, HandlerError};
pub use retry::RetryPolicy;
