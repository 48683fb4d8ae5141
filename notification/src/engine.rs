//! The notification dispatch engine.
//!
//! One engine instance per process. Incoming facts materialize pending
//! notification records; single-target facts are sent inline, fan-out facts
//! are left for the periodic sweep. The sweep is the only retry path for
//! transient delivery failures, and it only ever revisits `Pending` records.

use crate::domain::{
    Notification, NotificationChannel, NotificationStatus, NotificationUserType,
};
use crate::identity::IdentityStore;
use crate::sender::NotificationSender;
use crate::store::{NotificationStore, StoreError};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tablehop_core::environment::Clock;
use tablehop_core::fact::{
    DinnerCompleted, DinnerStarted, GuestId, HostId, InvoiceCreated, ReservationCanceled,
    ReservationCreated,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Timestamp format used in notification copy, e.g. `"Jun 01,2025 at 06:00 PM"`.
const DATE_TIME_FORMAT: &str = "%b %d,%Y at %I:%M %p";

/// Hard errors out of the dispatch engine.
///
/// These propagate to the consumer and are subject to the bus's retry and
/// dead-letter machinery. Delivery failures are not in this enum on purpose;
/// they are absorbed into `status = FAILED`.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A single-target fact referenced a guest the projection does not know.
    #[error("guest {0} not found in the identity projection")]
    UnknownGuest(GuestId),

    /// The notification or identity store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates, delivers and sweeps notifications.
pub struct DispatchEngine {
    store: Arc<dyn NotificationStore>,
    identities: Arc<dyn IdentityStore>,
    sender: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
}

impl DispatchEngine {
    /// Wire an engine from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn NotificationStore>,
        identities: Arc<dyn IdentityStore>,
        sender: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            identities,
            sender,
            clock,
        }
    }

    /// Build a fresh `Pending` notification record.
    #[must_use]
    pub fn create_notification(
        &self,
        user_id: i64,
        email: &str,
        subject: &str,
        description: &str,
        channel: NotificationChannel,
        user_type: NotificationUserType,
    ) -> Notification {
        Notification {
            id: Uuid::new_v4().to_string(),
            user_id,
            user_type,
            email: email.to_string(),
            subject: subject.to_string(),
            description: description.to_string(),
            created_at: self.clock.now(),
            delete_at: None,
            channel,
            status: NotificationStatus::Pending,
        }
    }

    /// Confirmation email for a new reservation. Sent inline.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnknownGuest`] if the identity projection has no row
    /// for the guest; [`DispatchError::Store`] on storage failure.
    pub async fn on_reservation_created(
        &self,
        fact: &ReservationCreated,
    ) -> Result<(), DispatchError> {
        let guest = self
            .identities
            .guest(fact.guest_id)
            .await?
            .ok_or(DispatchError::UnknownGuest(fact.guest_id))?;

        info!(guest_email = %guest.email, reservation_id = %fact.reservation_id, "handling reservation confirmation");
        let description = format!(
            "Dear {}, your reservation at {} on {} is confirmed. Reservation ID: {}",
            guest.name,
            fact.restaurant_name,
            fact.reservation_time.format(DATE_TIME_FORMAT),
            fact.reservation_id
        );
        let notification = self.create_notification(
            guest.id.0,
            &guest.email,
            "Reservation Confirmation",
            &description,
            NotificationChannel::Email,
            NotificationUserType::Guest,
        );
        self.store.save(&notification).await?;
        self.send_and_mark(notification).await?;
        Ok(())
    }

    /// Cancellation email for a removed reservation. Sent inline.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnknownGuest`] if the identity projection has no row
    /// for the guest; [`DispatchError::Store`] on storage failure.
    pub async fn on_reservation_canceled(
        &self,
        fact: &ReservationCanceled,
    ) -> Result<(), DispatchError> {
        let guest = self
            .identities
            .guest(fact.guest_id)
            .await?
            .ok_or(DispatchError::UnknownGuest(fact.guest_id))?;

        info!(guest_email = %guest.email, reservation_id = %fact.reservation_id, "handling reservation cancellation");
        let description = format!(
            "Dear {}, your reservation with ID {} has been successfully canceled.",
            guest.name, fact.reservation_id
        );
        let notification = self.create_notification(
            guest.id.0,
            &guest.email,
            "Reservation Canceled",
            &description,
            NotificationChannel::Email,
            NotificationUserType::Guest,
        );
        self.store.save(&notification).await?;
        self.send_and_mark(notification).await?;
        Ok(())
    }

    /// Invoice email. Sent inline.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnknownGuest`] if the identity projection has no row
    /// for the guest; [`DispatchError::Store`] on storage failure.
    pub async fn on_invoice_created(&self, fact: &InvoiceCreated) -> Result<(), DispatchError> {
        let guest = self
            .identities
            .guest(fact.guest_id)
            .await?
            .ok_or(DispatchError::UnknownGuest(fact.guest_id))?;

        info!(guest_email = %guest.email, invoice_id = %fact.invoice_id, "handling invoice notification");
        let description = format!(
            "Dear {}, your invoice for the recent dinner on {} is ready. Amount: {}. Invoice ID: {}",
            guest.name,
            fact.invoice_date.date_naive(),
            fact.amount,
            fact.invoice_id
        );
        let notification = self.create_notification(
            guest.id.0,
            &guest.email,
            "Your Dinner Invoice",
            &description,
            NotificationChannel::Email,
            NotificationUserType::Guest,
        );
        self.store.save(&notification).await?;
        self.send_and_mark(notification).await?;
        Ok(())
    }

    /// Fan-out for a started dinner: one in-app notification per resolvable
    /// guest, left `Pending` for the sweep.
    ///
    /// A guest missing from the identity projection is skipped with a
    /// warning; the rest of the list is still processed.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] on storage failure.
    pub async fn on_dinner_started(&self, fact: &DinnerStarted) -> Result<(), DispatchError> {
        if fact.guest_ids.is_empty() {
            warn!(dinner_id = %fact.dinner.id, "DinnerStarted carried no guest ids");
            return Ok(());
        }

        for guest_id in &fact.guest_ids {
            let Some(guest) = self.identities.guest(*guest_id).await? else {
                warn!(guest_id = %guest_id, "guest not found for DinnerStarted, skipping notification");
                continue;
            };

            info!(guest_email = %guest.email, dinner_id = %fact.dinner.id, "handling dinner start for guest");
            let description = format!(
                "Dear {}, your dinner at {} has just begun. Enjoy your meal!",
                guest.name, fact.dinner.name
            );
            let notification = self.create_notification(
                guest.id.0,
                &guest.email,
                "Dinner Has Started!",
                &description,
                NotificationChannel::InApp,
                NotificationUserType::Guest,
            );
            self.store.save(&notification).await?;
        }
        Ok(())
    }

    /// Fan-out for a completed dinner; same shape as
    /// [`DispatchEngine::on_dinner_started`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] on storage failure.
    pub async fn on_dinner_completed(&self, fact: &DinnerCompleted) -> Result<(), DispatchError> {
        if fact.guest_ids.is_empty() {
            warn!(dinner_id = %fact.dinner.id, "DinnerCompleted carried no guest ids");
            return Ok(());
        }

        for guest_id in &fact.guest_ids {
            let Some(guest) = self.identities.guest(*guest_id).await? else {
                warn!(guest_id = %guest_id, "guest not found for DinnerCompleted, skipping notification");
                continue;
            };

            let description = format!(
                "Dear {}, your dinner at {} has concluded. We hope you had a wonderful time!",
                guest.name, fact.dinner.name
            );
            let notification = self.create_notification(
                guest.id.0,
                &guest.email,
                "Dinner Concluded",
                &description,
                NotificationChannel::InApp,
                NotificationUserType::Guest,
            );
            self.store.save(&notification).await?;
        }
        Ok(())
    }

    /// Directly triggered notification, bypassing the bus: create, save and
    /// send synchronously. The user type is resolved from whichever identity
    /// projection knows the id, `Unknown` if neither does.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] on storage failure.
    pub async fn send_immediate(
        &self,
        user_id: i64,
        email: &str,
        subject: &str,
        description: &str,
        channel: NotificationChannel,
    ) -> Result<Notification, DispatchError> {
        info!(email = %email, channel = channel.as_str(), "sending immediate notification");

        let user_type = if self.identities.guest(GuestId(user_id)).await?.is_some() {
            NotificationUserType::Guest
        } else if self.identities.host(HostId(user_id)).await?.is_some() {
            NotificationUserType::Host
        } else {
            NotificationUserType::Unknown
        };

        let notification =
            self.create_notification(user_id, email, subject, description, channel, user_type);
        self.store.save(&notification).await?;
        let notification = self.send_and_mark(notification).await?;
        Ok(notification)
    }

    /// Attempt delivery and persist the resulting status.
    ///
    /// Ready records go to the channel adapter: success marks `Sent`, an
    /// adapter error marks `Failed`. A record that is not ready is marked
    /// `Failed` outright. Delivery problems never escape this method, so the
    /// triggering consumer's offset still commits.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] only if persisting the new status
    /// fails.
    pub async fn send_and_mark(
        &self,
        notification: Notification,
    ) -> Result<Notification, DispatchError> {
        if notification.is_ready_to_send() {
            match self.sender.send(&notification).await {
                Ok(()) => {
                    let sent = notification.mark_sent();
                    self.store.save(&sent).await?;
                    counter!("tablehop_notifications_sent_total", "channel" => sent.channel.as_str())
                        .increment(1);
                    info!(
                        notification_id = %sent.id,
                        email = %sent.email,
                        subject = %sent.subject,
                        "notification sent"
                    );
                    Ok(sent)
                }
                Err(e) => {
                    error!(
                        notification_id = %notification.id,
                        email = %notification.email,
                        error = %e,
                        "notification delivery failed"
                    );
                    let failed = notification.mark_failed();
                    self.store.save(&failed).await?;
                    counter!("tablehop_notifications_failed_total", "channel" => failed.channel.as_str())
                        .increment(1);
                    Ok(failed)
                }
            }
        } else {
            warn!(
                notification_id = %notification.id,
                status = notification.status.as_str(),
                email_empty = notification.email.is_empty(),
                "notification not ready to send"
            );
            let failed = notification.mark_failed();
            self.store.save(&failed).await?;
            counter!("tablehop_notifications_failed_total", "channel" => failed.channel.as_str())
                .increment(1);
            Ok(failed)
        }
    }

    /// One sweep pass: load every `Pending` record, oldest first, and run
    /// [`DispatchEngine::send_and_mark`] on each. Returns how many records
    /// were attempted.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] on storage failure.
    pub async fn process_pending(&self) -> Result<usize, DispatchError> {
        let pending = self.store.find_pending().await?;
        if pending.is_empty() {
            debug!("no pending notifications");
            return Ok(0);
        }

        let count = pending.len();
        for notification in pending {
            self.send_and_mark(notification).await?;
        }
        Ok(count)
    }

    /// Spawn the periodic sweep as a background task.
    ///
    /// First pass runs after `initial_delay`, then every `interval`. The
    /// task honors the shutdown broadcast.
    #[must_use]
    pub fn spawn_sweeper(
        self: Arc<Self>,
        initial_delay: Duration,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let engine = self;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + initial_delay;
            let mut ticker = tokio::time::interval_at(start, interval);
            info!(?initial_delay, ?interval, "notification sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("notification sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match engine.process_pending().await {
                            Ok(0) => {}
                            Ok(count) => info!(count, "sweep attempted pending notifications"),
                            Err(e) => error!(error = %e, "sweep pass failed"),
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::identity::{GuestRecord, InMemoryIdentityStore};
    use crate::sender::DeliveryError;
    use crate::store::InMemoryNotificationStore;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use tablehop_core::fact::{DinnerId, DinnerSnapshot, HostId as FactHostId, MenuId, ReservationId};
    use tablehop_testing::FixedClock;
    use tokio::sync::Mutex;

    /// Records the order of deliveries instead of sending anything.
    #[derive(Default)]
    struct RecordingSender {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
            self.delivered.lock().await.push(notification.id.clone());
            Ok(())
        }
    }

    /// Rejects every delivery.
    struct RejectingSender;

    #[async_trait]
    impl NotificationSender for RejectingSender {
        async fn send(&self, _notification: &Notification) -> Result<(), DeliveryError> {
            Err(DeliveryError("smtp unreachable".to_string()))
        }
    }

    struct Fixture {
        engine: Arc<DispatchEngine>,
        store: Arc<InMemoryNotificationStore>,
        identities: Arc<InMemoryIdentityStore>,
        sender: Arc<RecordingSender>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryNotificationStore::new());
        let identities = Arc::new(InMemoryIdentityStore::new());
        let sender = Arc::new(RecordingSender::default());
        let engine = Arc::new(DispatchEngine::new(
            store.clone(),
            identities.clone(),
            sender.clone(),
            Arc::new(FixedClock::new(Utc::now())),
        ));
        Fixture {
            engine,
            store,
            identities,
            sender,
        }
    }

    async fn register_guest(f: &Fixture, id: i64) {
        f.identities
            .upsert_guest(GuestRecord {
                id: GuestId(id),
                name: format!("guest-{id}"),
                email: format!("guest-{id}@example.com"),
            })
            .await
            .expect("upsert");
    }

    fn dinner_snapshot() -> DinnerSnapshot {
        DinnerSnapshot {
            id: DinnerId(7),
            host_id: FactHostId(1),
            menu_id: MenuId(1),
            name: "Chez Amina".to_string(),
            description: "test".to_string(),
            price: 20.0,
            start_time: Utc::now(),
            end_time: Utc::now() + ChronoDuration::hours(2),
            address: "1 Main St, Springfield, IL, 62701, USA".to_string(),
            cuisine_type: "Moroccan".to_string(),
            max_guest_count: 6,
            status: "IN_PROGRESS".to_string(),
        }
    }

    #[tokio::test]
    async fn reservation_confirmations_are_sent_inline() {
        let f = fixture();
        register_guest(&f, 5).await;

        let fact = ReservationCreated {
            reservation_id: ReservationId::generate(),
            dinner_id: DinnerId(7),
            guest_id: GuestId(5),
            reservation_time: Utc::now(),
            restaurant_name: "Chez Amina".to_string(),
        };
        f.engine.on_reservation_created(&fact).await.expect("handled");

        let all = f.store.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, NotificationStatus::Sent);
        assert_eq!(all[0].subject, "Reservation Confirmation");
        assert_eq!(all[0].email, "guest-5@example.com");
        assert!(all[0].description.contains("Chez Amina"));
        assert_eq!(f.sender.delivered.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn an_unknown_single_target_guest_is_a_hard_error() {
        let f = fixture();
        let fact = ReservationCanceled {
            reservation_id: ReservationId::generate(),
            dinner_id: DinnerId(7),
            guest_id: GuestId(999),
        };
        let err = f
            .engine
            .on_reservation_canceled(&fact)
            .await
            .expect_err("unknown guest");
        assert!(matches!(err, DispatchError::UnknownGuest(GuestId(999))));
        assert!(f.store.all().await.is_empty());
    }

    #[tokio::test]
    async fn dinner_start_fans_out_and_skips_missing_guests() {
        let f = fixture();
        register_guest(&f, 1).await;
        register_guest(&f, 3).await;

        let fact = DinnerStarted {
            dinner: dinner_snapshot(),
            guest_ids: vec![GuestId(1), GuestId(2), GuestId(3)],
        };
        f.engine.on_dinner_started(&fact).await.expect("no error escapes");

        let all = f.store.all().await;
        assert_eq!(all.len(), 2, "guest 2 is skipped");
        for n in &all {
            assert_eq!(n.status, NotificationStatus::Pending);
            assert_eq!(n.channel, NotificationChannel::InApp);
            assert_eq!(n.subject, "Dinner Has Started!");
        }
        assert!(
            f.sender.delivered.lock().await.is_empty(),
            "fan-out waits for the sweep"
        );
    }

    #[tokio::test]
    async fn the_sweep_processes_pending_oldest_first() {
        let f = fixture();
        let base = Utc::now();

        for (offset, id) in [(2, "n-third"), (0, "n-first"), (1, "n-second")] {
            let mut n = f.engine.create_notification(
                5,
                "guest-5@example.com",
                "subject",
                "body",
                NotificationChannel::Email,
                NotificationUserType::Guest,
            );
            n.id = id.to_string();
            n.created_at = base + ChronoDuration::seconds(offset);
            f.store.save(&n).await.expect("save");
        }

        let processed = f.engine.process_pending().await.expect("sweep");
        assert_eq!(processed, 3);
        assert_eq!(
            *f.sender.delivered.lock().await,
            vec![
                "n-first".to_string(),
                "n-second".to_string(),
                "n-third".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn failed_notifications_are_not_revisited() {
        let f = fixture();
        let n = f
            .engine
            .create_notification(
                5,
                "",
                "subject",
                "body",
                NotificationChannel::Email,
                NotificationUserType::Guest,
            );
        f.store.save(&n).await.expect("save");

        // Empty email: the first sweep marks it FAILED.
        assert_eq!(f.engine.process_pending().await.expect("sweep"), 1);
        let all = f.store.all().await;
        assert_eq!(all[0].status, NotificationStatus::Failed);

        // The next sweep no longer sees it.
        assert_eq!(f.engine.process_pending().await.expect("sweep"), 0);
    }

    #[tokio::test]
    async fn adapter_failures_are_absorbed_into_failed_status() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let identities = Arc::new(InMemoryIdentityStore::new());
        let engine = DispatchEngine::new(
            store.clone(),
            identities,
            Arc::new(RejectingSender),
            Arc::new(FixedClock::new(Utc::now())),
        );

        let n = engine.create_notification(
            5,
            "guest-5@example.com",
            "subject",
            "body",
            NotificationChannel::Email,
            NotificationUserType::Guest,
        );
        store.save(&n).await.expect("save");

        let result = engine.send_and_mark(n).await.expect("absorbed");
        assert_eq!(result.status, NotificationStatus::Failed);
    }

    #[tokio::test]
    async fn send_immediate_resolves_the_user_type() {
        let f = fixture();
        register_guest(&f, 5).await;

        let sent = f
            .engine
            .send_immediate(5, "guest-5@example.com", "Hello", "Welcome!", NotificationChannel::Push)
            .await
            .expect("sent");
        assert_eq!(sent.user_type, NotificationUserType::Guest);
        assert_eq!(sent.status, NotificationStatus::Sent);

        let unknown = f
            .engine
            .send_immediate(77, "stranger@example.com", "Hi", "Hello!", NotificationChannel::Email)
            .await
            .expect("sent");
        assert_eq!(unknown.user_type, NotificationUserType::Unknown);
    }

    #[tokio::test]
    async fn the_sweeper_task_drains_pending_work() {
        let f = fixture();
        register_guest(&f, 1).await;
        let fact = DinnerStarted {
            dinner: dinner_snapshot(),
            guest_ids: vec![GuestId(1)],
        };
        f.engine.on_dinner_started(&fact).await.expect("handled");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = f.engine.clone().spawn_sweeper(
            Duration::from_millis(10),
            Duration::from_millis(20),
            shutdown_rx,
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if f.sender.delivered.lock().await.len() == 1 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sweeper should deliver the pending notification");

        drop(shutdown_tx.send(()));
        task.await.expect("sweeper stops cleanly");

        let all = f.store.all().await;
        assert_eq!(all[0].status, NotificationStatus::Sent);
    }
}
