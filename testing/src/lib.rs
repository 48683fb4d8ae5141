//! # Tablehop Testing
//!
//! Testing utilities shared across the Tablehop services:
//!
//! - [`bus::InMemoryFactBus`] - a partitioned, consumer-group-aware event
//!   bus for tests and single-process wiring. Same delivery contract as the
//!   production bus (at-least-once, ordered per partition key), fast and
//!   synchronous enough for unit tests.
//! - [`mocks`] - deterministic environment implementations ([`FixedClock`]).
//! - [`handlers`] - [`RecordingHandler`](handlers::RecordingHandler) and
//!   [`FailingHandler`](handlers::FailingHandler) for exercising the
//!   consumer runtime.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod handlers;
pub mod mocks;

pub use bus::InMemoryFactBus;
pub use mocks::{FixedClock, test_clock};
