//! The shared, versioned fact schema.
//!
//! Facts are immutable records describing something that already happened.
//! Every fact carries enough data for a downstream consumer to act without
//! querying back the source service, which is why the dinner facts embed a
//! full [`DinnerSnapshot`] rather than a bare id.
//!
//! # Naming Convention
//!
//! Event-type identifiers are version-suffixed (`"DinnerCreated.v1"`) so the
//! schema can evolve without breaking old consumers.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use uuid::Uuid;

/// Topic names used across the marketplace.
///
/// Dead-letter topics derive from these via
/// [`dead_letter_topic`](crate::bus::dead_letter_topic).
pub mod topics {
    /// A dinner was created by its host.
    pub const DINNER_CREATED: &str = "dinner-created";
    /// A dinner's details were updated.
    pub const DINNER_UPDATED: &str = "dinner-updated";
    /// A dinner transitioned to in-progress.
    pub const DINNER_STARTED: &str = "dinner-started";
    /// A dinner was completed.
    pub const DINNER_COMPLETED: &str = "dinner-completed";
    /// A reservation was created.
    pub const RESERVATION_CREATED: &str = "reservation-created";
    /// A reservation was canceled.
    pub const RESERVATION_CANCELED: &str = "reservation-canceled";
    /// An invoice was issued for a dinner.
    pub const INVOICE_CREATED: &str = "invoice-created";
    /// A guest account was created.
    pub const GUEST_CREATED: &str = "guest-created";
    /// A host account was created.
    pub const HOST_CREATED: &str = "host-created";
}

/// A fact that can be published on the event bus.
///
/// Implementors are plain serde structs; the trait pins down the stable
/// event-type identifier, the topic the fact belongs to, and the partition
/// key that groups related facts for ordered delivery.
pub trait Fact: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable, version-suffixed event-type identifier (e.g. `"DinnerCreated.v1"`).
    const EVENT_TYPE: &'static str;

    /// Topic this fact is published to.
    const TOPIC: &'static str;

    /// Partition key for ordered delivery of related facts.
    fn partition_key(&self) -> String;
}

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident, $inner:ty) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Identifier of a dinner aggregate.
    DinnerId,
    i64
);
id_newtype!(
    /// Identifier of a guest account.
    GuestId,
    i64
);
id_newtype!(
    /// Identifier of a host account.
    HostId,
    i64
);
id_newtype!(
    /// Identifier of a menu.
    MenuId,
    i64
);

/// Globally unique identifier of a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    /// Generate a fresh, random reservation id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Denormalized copy of a dinner's state at the moment a fact was emitted.
///
/// Carried whole inside dinner facts so consumers (the reservation
/// projection, the dispatch engine) never have to call back into the dinner
/// service.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DinnerSnapshot {
    /// Dinner id.
    pub id: DinnerId,
    /// Hosting user.
    pub host_id: HostId,
    /// Menu served at the dinner.
    pub menu_id: MenuId,
    /// Display name (doubles as the restaurant name in notifications).
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Price per seat.
    pub price: f64,
    /// Scheduled start.
    pub start_time: DateTime<Utc>,
    /// Scheduled end.
    pub end_time: DateTime<Utc>,
    /// Formatted address ("street, city, state, postal code, country").
    pub address: String,
    /// Cuisine type.
    pub cuisine_type: String,
    /// Maximum number of guests.
    pub max_guest_count: i32,
    /// Lifecycle status at emission time.
    pub status: String,
}

/// A dinner was created. Carries a full snapshot.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DinnerCreated {
    /// Snapshot of the newly created dinner.
    pub dinner: DinnerSnapshot,
}

impl Fact for DinnerCreated {
    const EVENT_TYPE: &'static str = "DinnerCreated.v1";
    const TOPIC: &'static str = topics::DINNER_CREATED;

    fn partition_key(&self) -> String {
        self.dinner.id.to_string()
    }
}

/// A dinner's details were updated. Carries the post-update snapshot.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DinnerUpdated {
    /// Snapshot of the dinner after the update.
    pub dinner: DinnerSnapshot,
}

impl Fact for DinnerUpdated {
    const EVENT_TYPE: &'static str = "DinnerUpdated.v1";
    const TOPIC: &'static str = topics::DINNER_UPDATED;

    fn partition_key(&self) -> String {
        self.dinner.id.to_string()
    }
}

/// A dinner transitioned to in-progress.
///
/// Carries the guest-id list so the dispatch engine can fan out without a
/// synchronous call back to the reservation service.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DinnerStarted {
    /// Snapshot of the dinner at start time.
    pub dinner: DinnerSnapshot,
    /// Guests with a reservation for this dinner.
    pub guest_ids: Vec<GuestId>,
}

impl Fact for DinnerStarted {
    const EVENT_TYPE: &'static str = "DinnerStarted.v1";
    const TOPIC: &'static str = topics::DINNER_STARTED;

    fn partition_key(&self) -> String {
        self.dinner.id.to_string()
    }
}

/// A dinner was completed.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DinnerCompleted {
    /// Snapshot of the dinner at completion time.
    pub dinner: DinnerSnapshot,
    /// Guests with a reservation for this dinner.
    pub guest_ids: Vec<GuestId>,
}

impl Fact for DinnerCompleted {
    const EVENT_TYPE: &'static str = "DinnerCompleted.v1";
    const TOPIC: &'static str = topics::DINNER_COMPLETED;

    fn partition_key(&self) -> String {
        self.dinner.id.to_string()
    }
}

/// A reservation was created.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReservationCreated {
    /// Reservation id.
    pub reservation_id: ReservationId,
    /// Dinner the reservation is for.
    pub dinner_id: DinnerId,
    /// Guest holding the reservation.
    pub guest_id: GuestId,
    /// When the reservation was made.
    pub reservation_time: DateTime<Utc>,
    /// Restaurant name, for notification copy.
    pub restaurant_name: String,
}

impl Fact for ReservationCreated {
    const EVENT_TYPE: &'static str = "ReservationCreated.v1";
    const TOPIC: &'static str = topics::RESERVATION_CREATED;

    fn partition_key(&self) -> String {
        self.reservation_id.to_string()
    }
}

/// A reservation was canceled.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReservationCanceled {
    /// Reservation id.
    pub reservation_id: ReservationId,
    /// Dinner the reservation was for.
    pub dinner_id: DinnerId,
    /// Guest who held the reservation.
    pub guest_id: GuestId,
}

impl Fact for ReservationCanceled {
    const EVENT_TYPE: &'static str = "ReservationCanceled.v1";
    const TOPIC: &'static str = topics::RESERVATION_CANCELED;

    fn partition_key(&self) -> String {
        self.reservation_id.to_string()
    }
}

/// An invoice was issued for a dinner.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InvoiceCreated {
    /// Invoice id.
    pub invoice_id: String,
    /// Dinner the invoice refers to.
    pub dinner_id: DinnerId,
    /// Guest being billed.
    pub guest_id: GuestId,
    /// Formatted amount including currency (e.g. `"123.45 MAD"`).
    pub amount: String,
    /// When the invoice was issued.
    pub invoice_date: DateTime<Utc>,
}

impl Fact for InvoiceCreated {
    const EVENT_TYPE: &'static str = "InvoiceCreated.v1";
    const TOPIC: &'static str = topics::INVOICE_CREATED;

    fn partition_key(&self) -> String {
        self.invoice_id.clone()
    }
}

/// A guest account was created.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GuestCreated {
    /// Guest id.
    pub id: GuestId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}

impl Fact for GuestCreated {
    const EVENT_TYPE: &'static str = "GuestCreated.v1";
    const TOPIC: &'static str = topics::GUEST_CREATED;

    fn partition_key(&self) -> String {
        self.id.to_string()
    }
}

/// A host account was created.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostCreated {
    /// Host id.
    pub id: HostId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}

impl Fact for HostCreated {
    const EVENT_TYPE: &'static str = "HostCreated.v1";
    const TOPIC: &'static str = topics::HOST_CREATED;

    fn partition_key(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn partition_keys_group_by_aggregate() {
        let created = GuestCreated {
            id: GuestId(7),
            name: "Nora".to_string(),
            email: "nora@example.com".to_string(),
        };
        assert_eq!(created.partition_key(), "7");
        assert_eq!(GuestCreated::TOPIC, "guest-created");
        assert_eq!(GuestCreated::EVENT_TYPE, "GuestCreated.v1");
    }

    #[test]
    fn reservation_ids_are_unique() {
        assert_ne!(ReservationId::generate(), ReservationId::generate());
    }

    #[test]
    fn dinner_facts_partition_by_dinner_id() {
        let snapshot = DinnerSnapshot {
            id: DinnerId(42),
            host_id: HostId(1),
            menu_id: MenuId(2),
            name: "Tagine Night".to_string(),
            description: "Slow-cooked lamb".to_string(),
            price: 35.0,
            start_time: Utc::now(),
            end_time: Utc::now() + chrono::Duration::hours(3),
            address: "1 Rue Atlas, Marrakesh, MK, 40000, Morocco".to_string(),
            cuisine_type: "Moroccan".to_string(),
            max_guest_count: 8,
            status: "UPCOMING".to_string(),
        };
        let started = DinnerStarted {
            dinner: snapshot,
            guest_ids: vec![GuestId(1), GuestId(2)],
        };
        assert_eq!(started.partition_key(), "42");
    }
}
