//! The Reservation record and its errors.

use chrono::{DateTime, Utc};
use tablehop_core::fact::{DinnerId, GuestId, ReservationId};
use thiserror::Error;

/// Errors surfaced by reservation operations.
#[derive(Error, Debug)]
pub enum ReservationError {
    /// No reservation exists with the given id.
    #[error("reservation {0} not found")]
    NotFound(ReservationId),

    /// The repository failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The record change went through but the fact could not be published.
    #[error("failed to publish {event_type}: {reason}")]
    Publish {
        /// Event type that failed to publish.
        event_type: String,
        /// Transport-level reason.
        reason: String,
    },
}

/// A guest's reservation for a dinner.
///
/// Immutable between creation and cancellation; cancellation removes the
/// record entirely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reservation {
    /// Globally unique reservation id.
    pub id: ReservationId,
    /// Dinner being reserved.
    pub dinner_id: DinnerId,
    /// Guest holding the reservation.
    pub guest_id: GuestId,
    /// When the reservation was made.
    pub reservation_date: DateTime<Utc>,
}

impl Reservation {
    /// Create a reservation with a fresh random id.
    #[must_use]
    pub fn new(dinner_id: DinnerId, guest_id: GuestId, reservation_date: DateTime<Utc>) -> Self {
        Self {
            id: ReservationId::generate(),
            dinner_id,
            guest_id,
            reservation_date,
        }
    }
}
