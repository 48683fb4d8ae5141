//! # Tablehop Dinner Service
//!
//! Owns the Dinner aggregate: the only service allowed to create dinners and
//! move them through their lifecycle. Every transition that other services
//! care about is announced as a fact on the event bus; nothing reads this
//! service's storage directly.
//!
//! # Lifecycle
//!
//! ```text
//!              start
//!   UPCOMING ────────► IN_PROGRESS ────► COMPLETED (terminal)
//!      │                   ▲     complete
//!      │ reschedule        │ start
//!      ▼                   │
//!   RESCHEDULED ───────────┘
//! ```
//!
//! Any other requested transition fails with
//! [`DinnerError::InvalidStateTransition`] and leaves the state unchanged.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod domain;
pub mod service;

pub use domain::{Address, Dinner, DinnerError, DinnerStatus, NewDinner, TimeRange};
pub use service::{
    DinnerLifecycle, DinnerRepository, GuestListError, GuestListSource, IdentityDirectory,
    InMemoryDinnerRepository, LookupError, MenuDirectory, StubIdentityDirectory,
    StubMenuDirectory,
};
