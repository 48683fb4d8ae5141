//! The reservation orchestrator.
//!
//! Creates and cancels reservations, announces both on the bus, and serves
//! read queries from live records. On cancellation the fact is published
//! **before** the record is deleted; a crash between the two leaves a stale
//! row behind rather than an unannounced deletion.

use crate::domain::{Reservation, ReservationError};
use crate::projection::DinnerProjectionStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tablehop_core::bus::{EventBus, publish_fact};
use tablehop_core::environment::Clock;
use tablehop_core::fact::{
    DinnerId, GuestId, ReservationCanceled, ReservationCreated, ReservationId,
};
use tokio::sync::Mutex;
use tracing::info;

/// Name used in `ReservationCreated` when the dinner projection has no row
/// for the dinner yet.
const UNKNOWN_RESTAURANT: &str = "Unknown Restaurant";

/// Persistence boundary for reservations.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Persist a new reservation.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Storage`] on storage failure.
    async fn insert(&self, reservation: &Reservation) -> Result<(), ReservationError>;

    /// Remove a reservation.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Storage`] on storage failure.
    async fn delete(&self, id: ReservationId) -> Result<(), ReservationError>;

    /// Fetch a reservation by id.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Storage`] on storage failure.
    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, ReservationError>;

    /// All reservations held by a guest.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Storage`] on storage failure.
    async fn find_by_guest(&self, guest_id: GuestId) -> Result<Vec<Reservation>, ReservationError>;

    /// All reservations for a dinner.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Storage`] on storage failure.
    async fn find_by_dinner(
        &self,
        dinner_id: DinnerId,
    ) -> Result<Vec<Reservation>, ReservationError>;
}

/// In-memory reservation repository for tests and single-process wiring.
#[derive(Default)]
pub struct InMemoryReservationRepository {
    reservations: Mutex<HashMap<ReservationId, Reservation>>,
}

impl InMemoryReservationRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn insert(&self, reservation: &Reservation) -> Result<(), ReservationError> {
        self.reservations
            .lock()
            .await
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn delete(&self, id: ReservationId) -> Result<(), ReservationError> {
        self.reservations.lock().await.remove(&id);
        Ok(())
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, ReservationError> {
        Ok(self.reservations.lock().await.get(&id).cloned())
    }

    async fn find_by_guest(&self, guest_id: GuestId) -> Result<Vec<Reservation>, ReservationError> {
        let mut found: Vec<Reservation> = self
            .reservations
            .lock()
            .await
            .values()
            .filter(|r| r.guest_id == guest_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.reservation_date);
        Ok(found)
    }

    async fn find_by_dinner(
        &self,
        dinner_id: DinnerId,
    ) -> Result<Vec<Reservation>, ReservationError> {
        let mut found: Vec<Reservation> = self
            .reservations
            .lock()
            .await
            .values()
            .filter(|r| r.dinner_id == dinner_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.reservation_date);
        Ok(found)
    }
}

/// Command handlers and read queries for reservations.
pub struct ReservationOrchestrator {
    repository: Arc<dyn ReservationRepository>,
    dinners: Arc<dyn DinnerProjectionStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
}

impl ReservationOrchestrator {
    /// Wire an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ReservationRepository>,
        dinners: Arc<dyn DinnerProjectionStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            dinners,
            bus,
            clock,
        }
    }

    /// Create a reservation and announce it.
    ///
    /// The `ReservationCreated` fact is enriched with the restaurant name
    /// from the dinner projection; a missing projection row falls back to
    /// `"Unknown Restaurant"` rather than blocking the booking.
    ///
    /// # Errors
    ///
    /// [`ReservationError::Storage`] on repository failure, or
    /// [`ReservationError::Publish`] if the record was persisted but the
    /// fact could not be published.
    pub async fn create_reservation(
        &self,
        dinner_id: DinnerId,
        guest_id: GuestId,
    ) -> Result<Reservation, ReservationError> {
        let reservation = Reservation::new(dinner_id, guest_id, self.clock.now());
        self.repository.insert(&reservation).await?;

        let restaurant_name = self
            .dinners
            .get(dinner_id)
            .await?
            .map_or_else(|| UNKNOWN_RESTAURANT.to_string(), |snapshot| snapshot.name);

        let fact = ReservationCreated {
            reservation_id: reservation.id,
            dinner_id,
            guest_id,
            reservation_time: reservation.reservation_date,
            restaurant_name,
        };
        publish_fact(self.bus.as_ref(), &fact)
            .await
            .map_err(|e| ReservationError::Publish {
                event_type: "ReservationCreated.v1".to_string(),
                reason: e.to_string(),
            })?;

        info!(
            reservation_id = %reservation.id,
            dinner_id = %dinner_id,
            guest_id = %guest_id,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Cancel a reservation.
    ///
    /// Publishes `ReservationCanceled` first, then deletes the record. A
    /// crash between the two steps leaves a stale reservation row that a
    /// later cancellation attempt can clean up; the announced cancellation
    /// is never lost.
    ///
    /// # Errors
    ///
    /// [`ReservationError::NotFound`] for an unknown id,
    /// [`ReservationError::Publish`] if the fact could not be published (the
    /// record is kept in that case).
    pub async fn cancel_reservation(&self, id: ReservationId) -> Result<(), ReservationError> {
        let reservation = self
            .repository
            .get(id)
            .await?
            .ok_or(ReservationError::NotFound(id))?;

        let fact = ReservationCanceled {
            reservation_id: reservation.id,
            dinner_id: reservation.dinner_id,
            guest_id: reservation.guest_id,
        };
        publish_fact(self.bus.as_ref(), &fact)
            .await
            .map_err(|e| ReservationError::Publish {
                event_type: "ReservationCanceled.v1".to_string(),
                reason: e.to_string(),
            })?;

        self.repository.delete(id).await?;
        info!(reservation_id = %id, "reservation canceled");
        Ok(())
    }

    /// Guest ids with a live reservation for the dinner.
    ///
    /// Served from live records, not the projection: this is the lookup the
    /// dinner service performs synchronously at start time.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Storage`] on repository failure.
    pub async fn guest_ids_for_dinner(
        &self,
        dinner_id: DinnerId,
    ) -> Result<Vec<GuestId>, ReservationError> {
        let reservations = self.repository.find_by_dinner(dinner_id).await?;
        Ok(reservations.into_iter().map(|r| r.guest_id).collect())
    }

    /// A guest's reservations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Storage`] on repository failure.
    pub async fn reservations_by_guest(
        &self,
        guest_id: GuestId,
    ) -> Result<Vec<Reservation>, ReservationError> {
        self.repository.find_by_guest(guest_id).await
    }

    /// A dinner's reservations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Storage`] on repository failure.
    pub async fn reservations_for_dinner(
        &self,
        dinner_id: DinnerId,
    ) -> Result<Vec<Reservation>, ReservationError> {
        self.repository.find_by_dinner(dinner_id).await
    }

    /// Fetch a reservation by id.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::NotFound`] for an unknown id.
    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, ReservationError> {
        self.repository
            .get(id)
            .await?
            .ok_or(ReservationError::NotFound(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::projection::{DinnerProjectionHandler, InMemoryDinnerProjection};
    use chrono::Utc;
    use tablehop_core::envelope::FactEnvelope;
    use tablehop_core::fact::{DinnerCreated, DinnerSnapshot, HostId, MenuId};
    use tablehop_runtime::FactHandler;
    use tablehop_testing::{FixedClock, InMemoryFactBus};

    fn snapshot(dinner_id: i64, name: &str) -> DinnerSnapshot {
        DinnerSnapshot {
            id: DinnerId(dinner_id),
            host_id: HostId(1),
            menu_id: MenuId(1),
            name: name.to_string(),
            description: "test".to_string(),
            price: 20.0,
            start_time: Utc::now(),
            end_time: Utc::now() + chrono::Duration::hours(2),
            address: "1 Main St, Springfield, IL, 62701, USA".to_string(),
            cuisine_type: "Italian".to_string(),
            max_guest_count: 6,
            status: "UPCOMING".to_string(),
        }
    }

    struct Fixture {
        orchestrator: ReservationOrchestrator,
        projection: Arc<InMemoryDinnerProjection>,
        bus: Arc<InMemoryFactBus>,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(InMemoryFactBus::new());
        let projection = Arc::new(InMemoryDinnerProjection::new());
        let orchestrator = ReservationOrchestrator::new(
            Arc::new(InMemoryReservationRepository::new()),
            projection.clone(),
            bus.clone(),
            Arc::new(FixedClock::new(Utc::now())),
        );
        Fixture {
            orchestrator,
            projection,
            bus,
        }
    }

    #[tokio::test]
    async fn creating_a_reservation_publishes_the_enriched_fact() {
        let f = fixture();
        f.projection
            .upsert(snapshot(7, "Chez Amina"))
            .await
            .expect("upsert");

        let reservation = f
            .orchestrator
            .create_reservation(DinnerId(7), GuestId(5))
            .await
            .expect("create");

        let published = f.bus.published("reservation-created").await;
        assert_eq!(published.len(), 1);
        let fact: ReservationCreated = published[0].decode().expect("decodable");
        assert_eq!(fact.reservation_id, reservation.id);
        assert_eq!(fact.dinner_id, DinnerId(7));
        assert_eq!(fact.guest_id, GuestId(5));
        assert_eq!(fact.restaurant_name, "Chez Amina");
    }

    #[tokio::test]
    async fn a_lagging_projection_falls_back_to_unknown_restaurant() {
        let f = fixture();
        f.orchestrator
            .create_reservation(DinnerId(99), GuestId(5))
            .await
            .expect("create");

        let published = f.bus.published("reservation-created").await;
        let fact: ReservationCreated = published[0].decode().expect("decodable");
        assert_eq!(fact.restaurant_name, "Unknown Restaurant");
    }

    #[tokio::test]
    async fn cancellation_publishes_before_deleting() {
        let f = fixture();
        let reservation = f
            .orchestrator
            .create_reservation(DinnerId(7), GuestId(5))
            .await
            .expect("create");

        f.orchestrator
            .cancel_reservation(reservation.id)
            .await
            .expect("cancel");

        let published = f.bus.published("reservation-canceled").await;
        assert_eq!(published.len(), 1);
        let fact: ReservationCanceled = published[0].decode().expect("decodable");
        assert_eq!(fact.reservation_id, reservation.id);

        let err = f
            .orchestrator
            .get_reservation(reservation.id)
            .await
            .expect_err("record is gone");
        assert!(matches!(err, ReservationError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancelling_an_unknown_reservation_is_not_found() {
        let f = fixture();
        let err = f
            .orchestrator
            .cancel_reservation(ReservationId::generate())
            .await
            .expect_err("unknown id");
        assert!(matches!(err, ReservationError::NotFound(_)));
        assert!(f.bus.published("reservation-canceled").await.is_empty());
    }

    #[tokio::test]
    async fn guest_lists_come_from_live_records() {
        let f = fixture();
        f.orchestrator
            .create_reservation(DinnerId(7), GuestId(5))
            .await
            .expect("create");
        f.orchestrator
            .create_reservation(DinnerId(7), GuestId(9))
            .await
            .expect("create");
        f.orchestrator
            .create_reservation(DinnerId(8), GuestId(2))
            .await
            .expect("create");

        let mut guests = f
            .orchestrator
            .guest_ids_for_dinner(DinnerId(7))
            .await
            .expect("guest list");
        guests.sort();
        assert_eq!(guests, vec![GuestId(5), GuestId(9)]);
    }

    #[tokio::test]
    async fn the_projection_handler_upserts_idempotently() {
        let projection = Arc::new(InMemoryDinnerProjection::new());
        let handler = DinnerProjectionHandler::new(projection.clone());

        let fact = DinnerCreated {
            dinner: snapshot(3, "Trattoria Da Enzo"),
        };
        let envelope = FactEnvelope::from_fact(&fact).expect("encodable");

        handler.handle(&envelope).await.expect("first delivery");
        handler.handle(&envelope).await.expect("redelivery is harmless");

        let row = projection
            .get(DinnerId(3))
            .await
            .expect("store read")
            .expect("row exists");
        assert_eq!(row.name, "Trattoria Da Enzo");
    }

    #[tokio::test]
    async fn the_projection_handler_ignores_unrelated_facts() {
        let projection = Arc::new(InMemoryDinnerProjection::new());
        let handler = DinnerProjectionHandler::new(projection.clone());

        let fact = tablehop_core::fact::GuestCreated {
            id: GuestId(1),
            name: "Nora".to_string(),
            email: "nora@example.com".to_string(),
        };
        let envelope = FactEnvelope::from_fact(&fact).expect("encodable");
        handler.handle(&envelope).await.expect("ignored without error");
    }
}
