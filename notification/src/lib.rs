//! # Tablehop Notification Service
//!
//! Consumes every upstream fact addressed to a human and turns it into a
//! [`Notification`](domain::Notification) record, attempts delivery through
//! a channel adapter, and sweeps undelivered work on a fixed timer.
//!
//! # Moving Parts
//!
//! - [`identity`] - local lookup copies of guest/host contact data, kept
//!   current by consuming identity-creation facts. The only data source the
//!   dispatch engine resolves recipients from.
//! - [`engine`] - the dispatch engine: per-fact handlers, notification
//!   creation, the send-and-mark loop and the periodic sweep.
//! - [`handler`] - the bus-facing [`FactHandler`](tablehop_runtime::FactHandler)
//!   that routes envelopes into the engine.
//! - [`sender`] - channel adapters (email, push, in-app).
//! - [`store`] - persistence boundary for notification records. Records are
//!   an audit trail: status changes, rows are never deleted.
//!
//! # Failure Semantics
//!
//! Delivery failures are absorbed into `status = FAILED` and never re-thrown;
//! the bus's retry machinery only sees hard errors (unknown single-target
//! recipient, undecodable payload, storage faults). Only `PENDING` records
//! are swept; `FAILED` ones stay put for manual inspection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod domain;
pub mod engine;
pub mod handler;
pub mod identity;
pub mod sender;
pub mod store;

pub use config::DispatchConfig;
pub use domain::{Notification, NotificationChannel, NotificationStatus, NotificationUserType};
pub use engine::{DispatchEngine, DispatchError};
pub use handler::DispatchHandler;
pub use identity::{
    GuestRecord, HostRecord, IdentityProjectionHandler, IdentityStore, InMemoryIdentityStore,
};
pub use sender::{ChannelRouter, DeliveryError, EmailSender, InAppSender, NotificationSender, PushSender};
pub use store::{InMemoryNotificationStore, NotificationStore, StoreError};
