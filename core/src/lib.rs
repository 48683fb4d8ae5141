//! # Tablehop Core
//!
//! Shared contracts for the Tablehop dinner marketplace services.
//!
//! The marketplace is split across independently deployable services (dinner
//! lifecycle, reservations, notification dispatch, identity). They share no
//! database; every cross-service effect travels as an immutable **fact** over
//! the event bus. This crate owns the pieces every service agrees on:
//!
//! - [`fact`] - the single, versioned fact schema consumed by all services.
//!   Each logical event is defined exactly once here instead of being
//!   re-declared per service, so wire compatibility is an explicit contract.
//! - [`envelope`] - the self-describing wire format a fact travels in
//!   (JSON payload plus event-type, partition key and correlation metadata).
//! - [`bus`] - the [`EventBus`](bus::EventBus) trait with at-least-once
//!   publish/subscribe semantics and consumer groups.
//! - [`environment`] - the [`Clock`](environment::Clock) trait so services
//!   never reach for wall-clock time directly.
//!
//! # Delivery Semantics
//!
//! The bus contract is **at-least-once**: a fact may be delivered more than
//! once, and consumers must tolerate duplicates without corrupting state.
//! Facts sharing a partition key are delivered to a consumer group in publish
//! order; there is no ordering guarantee across different keys.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod envelope;
pub mod environment;
pub mod fact;

pub use bus::{EventBus, EventBusError, FactStream, dead_letter_topic, publish_fact};
pub use envelope::{FactEnvelope, FactError};
pub use fact::Fact;
