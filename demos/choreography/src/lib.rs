//! In-process wiring of the whole marketplace over the in-memory bus.
//!
//! Production deploys each service in its own process against a Kafka
//! broker. For demos and end-to-end tests the same services, consumers and
//! sweep run inside one process on
//! [`InMemoryFactBus`](tablehop_testing::InMemoryFactBus), with identical
//! choreography: the only coupling between services is the fact schema.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use std::sync::Arc;
use tablehop_core::environment::Clock;
use tablehop_core::fact::{DinnerId, GuestId, topics};
use tablehop_dinner::{
    DinnerLifecycle, GuestListError, GuestListSource, InMemoryDinnerRepository,
    StubIdentityDirectory, StubMenuDirectory,
};
use tablehop_notification::{
    ChannelRouter, DispatchConfig, DispatchEngine, DispatchHandler, IdentityProjectionHandler,
    InMemoryIdentityStore, InMemoryNotificationStore,
};
use tablehop_reservation::{
    DinnerProjectionHandler, InMemoryDinnerProjection, InMemoryReservationRepository,
    ReservationOrchestrator,
};
use tablehop_runtime::FactConsumer;
use tablehop_testing::InMemoryFactBus;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Serves the dinner service's synchronous guest-list fetch straight from
/// the reservation orchestrator. In production this is an HTTP call; the
/// trait seam is the same either way.
pub struct ReservationGuestList {
    reservations: Arc<ReservationOrchestrator>,
}

impl ReservationGuestList {
    /// Adapter over the given orchestrator.
    #[must_use]
    pub fn new(reservations: Arc<ReservationOrchestrator>) -> Self {
        Self { reservations }
    }
}

#[async_trait]
impl GuestListSource for ReservationGuestList {
    async fn guest_ids(&self, dinner_id: DinnerId) -> Result<Vec<GuestId>, GuestListError> {
        self.reservations
            .guest_ids_for_dinner(dinner_id)
            .await
            .map_err(|e| GuestListError(e.to_string()))
    }
}

/// The fully wired marketplace.
pub struct Marketplace {
    /// The shared event bus.
    pub bus: Arc<InMemoryFactBus>,
    /// Dinner lifecycle manager.
    pub dinners: Arc<DinnerLifecycle>,
    /// Reservation orchestrator.
    pub reservations: Arc<ReservationOrchestrator>,
    /// Notification dispatch engine.
    pub notifications: Arc<DispatchEngine>,
    /// Notification audit trail.
    pub notification_store: Arc<InMemoryNotificationStore>,
    /// Identity projection rows.
    pub identity_store: Arc<InMemoryIdentityStore>,
    /// Reservation-side dinner projection.
    pub dinner_projection: Arc<InMemoryDinnerProjection>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Marketplace {
    /// Wire every service, spawn the consumers and the sweep.
    #[must_use]
    pub fn start(clock: Arc<dyn Clock>, config: &DispatchConfig) -> Self {
        let bus = Arc::new(InMemoryFactBus::new());
        let (shutdown_tx, _) = broadcast::channel(8);

        // Reservation service.
        let dinner_projection = Arc::new(InMemoryDinnerProjection::new());
        let reservations = Arc::new(ReservationOrchestrator::new(
            Arc::new(InMemoryReservationRepository::new()),
            dinner_projection.clone(),
            bus.clone(),
            clock.clone(),
        ));

        // Dinner service, reading guest lists live from reservations.
        let dinners = Arc::new(DinnerLifecycle::new(
            Arc::new(InMemoryDinnerRepository::new()),
            Arc::new(StubIdentityDirectory),
            Arc::new(StubMenuDirectory),
            Arc::new(ReservationGuestList::new(reservations.clone())),
            bus.clone(),
            clock.clone(),
        ));

        // Notification service.
        let notification_store = Arc::new(InMemoryNotificationStore::new());
        let identity_store = Arc::new(InMemoryIdentityStore::new());
        let notifications = Arc::new(DispatchEngine::new(
            notification_store.clone(),
            identity_store.clone(),
            Arc::new(ChannelRouter::new()),
            clock,
        ));

        let mut tasks = Vec::new();
        tasks.push(
            FactConsumer::new(
                "reservation-dinner-projection",
                vec![topics::DINNER_CREATED.to_string()],
                "reservation-service",
                bus.clone(),
                Arc::new(DinnerProjectionHandler::new(dinner_projection.clone())),
                shutdown_tx.subscribe(),
            )
            .spawn(),
        );
        tasks.push(
            FactConsumer::new(
                "identity-projection",
                vec![
                    topics::GUEST_CREATED.to_string(),
                    topics::HOST_CREATED.to_string(),
                ],
                config.identity_consumer_group.as_str(),
                bus.clone(),
                Arc::new(IdentityProjectionHandler::new(identity_store.clone())),
                shutdown_tx.subscribe(),
            )
            .spawn(),
        );
        tasks.push(
            FactConsumer::new(
                "notification-dispatch",
                DispatchHandler::topics(),
                config.consumer_group.as_str(),
                bus.clone(),
                Arc::new(DispatchHandler::new(notifications.clone())),
                shutdown_tx.subscribe(),
            )
            .spawn(),
        );
        tasks.push(notifications.clone().spawn_sweeper(
            config.sweep_initial_delay(),
            config.sweep_interval(),
            shutdown_tx.subscribe(),
        ));

        Self {
            bus,
            dinners,
            reservations,
            notifications,
            notification_store,
            identity_store,
            dinner_projection,
            shutdown_tx,
            tasks,
        }
    }

    /// Signal shutdown and wait for every background task to stop.
    pub async fn shutdown(self) {
        drop(self.shutdown_tx.send(()));
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
