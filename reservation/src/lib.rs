//! # Tablehop Reservation Service
//!
//! Owns reservations: creates and cancels them, announces both as facts,
//! and serves the guest-id list the dinner service fetches when a dinner
//! starts.
//!
//! Two consistency paths deliberately coexist:
//!
//! - **Live records** back the guest-list lookup and all read queries.
//! - A **dinner projection**, fed asynchronously from `DinnerCreated`
//!   facts, enriches reservation responses (restaurant name). It may lag or
//!   be missing and is never used for authoritative decisions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod domain;
pub mod projection;
pub mod service;

pub use domain::{Reservation, ReservationError};
pub use projection::{DinnerProjectionHandler, DinnerProjectionStore, InMemoryDinnerProjection};
pub use service::{InMemoryReservationRepository, ReservationOrchestrator, ReservationRepository};
