//! Command handlers for the dinner lifecycle.
//!
//! [`DinnerLifecycle`] is the only writer of dinner state. Each handler
//! follows the same shape: load, apply the aggregate rule, persist, then
//! publish the resulting fact explicitly. Publication always happens after
//! the commit, never from inside the persistence layer.

use crate::domain::{Dinner, DinnerError, DinnerStatus, NewDinner};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tablehop_core::bus::{EventBus, publish_fact};
use tablehop_core::environment::Clock;
use tablehop_core::fact::{
    DinnerCompleted, DinnerCreated, DinnerId, DinnerStarted, DinnerUpdated, GuestId, MenuId,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Failure of a synchronous identity or menu existence check.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct LookupError(pub String);

/// Failure of the synchronous guest-list fetch at dinner start.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct GuestListError(pub String);

/// Read-only identity existence service (external collaborator).
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Whether a user with this id exists.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the directory cannot be reached.
    async fn exists(&self, user_id: i64) -> Result<bool, LookupError>;

    /// Whether the user exists and is a host.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the directory cannot be reached.
    async fn is_host(&self, user_id: i64) -> Result<bool, LookupError>;
}

/// Read-only menu existence service (external collaborator).
#[async_trait]
pub trait MenuDirectory: Send + Sync {
    /// Whether a menu with this id exists.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the directory cannot be reached.
    async fn exists(&self, menu_id: MenuId) -> Result<bool, LookupError>;
}

/// Source of the guest-id list for a dinner, served by the reservation
/// service from its live records.
#[async_trait]
pub trait GuestListSource: Send + Sync {
    /// Guests holding a reservation for the dinner.
    ///
    /// # Errors
    ///
    /// Returns [`GuestListError`] if the reservation service cannot be
    /// reached. There is no timeout or retry around this call; the caller
    /// decides what a failure means.
    async fn guest_ids(&self, dinner_id: DinnerId) -> Result<Vec<GuestId>, GuestListError>;
}

/// Identity directory stub that accepts every user as an existing host.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubIdentityDirectory;

#[async_trait]
impl IdentityDirectory for StubIdentityDirectory {
    async fn exists(&self, _user_id: i64) -> Result<bool, LookupError> {
        Ok(true)
    }

    async fn is_host(&self, _user_id: i64) -> Result<bool, LookupError> {
        Ok(true)
    }
}

/// Menu directory stub that reports every menu as existing.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubMenuDirectory;

#[async_trait]
impl MenuDirectory for StubMenuDirectory {
    async fn exists(&self, _menu_id: MenuId) -> Result<bool, LookupError> {
        Ok(true)
    }
}

/// Persistence boundary for the dinner aggregate.
#[async_trait]
pub trait DinnerRepository: Send + Sync {
    /// Insert a new dinner, assigning its id.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::Storage`] on storage failure.
    async fn insert(&self, dinner: Dinner) -> Result<Dinner, DinnerError>;

    /// Persist the current state of an existing dinner.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::Storage`] on storage failure.
    async fn update(&self, dinner: &Dinner) -> Result<(), DinnerError>;

    /// Fetch a dinner by id.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::Storage`] on storage failure.
    async fn get(&self, id: DinnerId) -> Result<Option<Dinner>, DinnerError>;

    /// All dinners under a menu in the given status.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::Storage`] on storage failure.
    async fn find_by_menu_and_status(
        &self,
        menu_id: MenuId,
        status: DinnerStatus,
    ) -> Result<Vec<Dinner>, DinnerError>;
}

/// In-memory dinner repository for tests and single-process wiring.
pub struct InMemoryDinnerRepository {
    dinners: Mutex<HashMap<i64, Dinner>>,
    next_id: AtomicI64,
}

impl Default for InMemoryDinnerRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDinnerRepository {
    /// Create an empty repository. Ids are assigned sequentially from 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dinners: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl DinnerRepository for InMemoryDinnerRepository {
    async fn insert(&self, dinner: Dinner) -> Result<Dinner, DinnerError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let dinner = dinner.with_id(DinnerId(id));
        self.dinners.lock().await.insert(id, dinner.clone());
        Ok(dinner)
    }

    async fn update(&self, dinner: &Dinner) -> Result<(), DinnerError> {
        self.dinners
            .lock()
            .await
            .insert(dinner.id().0, dinner.clone());
        Ok(())
    }

    async fn get(&self, id: DinnerId) -> Result<Option<Dinner>, DinnerError> {
        Ok(self.dinners.lock().await.get(&id.0).cloned())
    }

    async fn find_by_menu_and_status(
        &self,
        menu_id: MenuId,
        status: DinnerStatus,
    ) -> Result<Vec<Dinner>, DinnerError> {
        let dinners = self.dinners.lock().await;
        let mut found: Vec<Dinner> = dinners
            .values()
            .filter(|d| d.menu_id() == menu_id && d.status() == status)
            .cloned()
            .collect();
        found.sort_by_key(Dinner::id);
        Ok(found)
    }
}

/// Command handlers for the dinner lifecycle.
pub struct DinnerLifecycle {
    repository: Arc<dyn DinnerRepository>,
    identities: Arc<dyn IdentityDirectory>,
    menus: Arc<dyn MenuDirectory>,
    guest_lists: Arc<dyn GuestListSource>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
}

impl DinnerLifecycle {
    /// Wire a lifecycle manager from its collaborators.
    #[must_use]
    pub fn new(
        repository: Arc<dyn DinnerRepository>,
        identities: Arc<dyn IdentityDirectory>,
        menus: Arc<dyn MenuDirectory>,
        guest_lists: Arc<dyn GuestListSource>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            identities,
            menus,
            guest_lists,
            bus,
            clock,
        }
    }

    /// Create a dinner and announce it.
    ///
    /// Validates the host and menu against their directories, builds the
    /// aggregate (always `Upcoming`), persists it, then publishes
    /// `DinnerCreated` with a full snapshot.
    ///
    /// # Errors
    ///
    /// [`DinnerError::Validation`] for rejected fields or unknown host/menu,
    /// [`DinnerError::Collaborator`] if a directory is unreachable,
    /// [`DinnerError::Publish`] if the dinner was persisted but the fact
    /// could not be published.
    pub async fn create(&self, spec: NewDinner) -> Result<Dinner, DinnerError> {
        if !self
            .identities
            .is_host(spec.host_id)
            .await
            .map_err(|e| DinnerError::Collaborator(e.to_string()))?
        {
            return Err(DinnerError::Validation(
                "user does not exist or is not a host".to_string(),
            ));
        }
        if !self
            .menus
            .exists(MenuId(spec.menu_id))
            .await
            .map_err(|e| DinnerError::Collaborator(e.to_string()))?
        {
            return Err(DinnerError::Validation("menu does not exist".to_string()));
        }

        let dinner = Dinner::new(&spec)?;
        let dinner = self.repository.insert(dinner).await?;

        let fact = DinnerCreated {
            dinner: dinner.snapshot(),
        };
        publish_fact(self.bus.as_ref(), &fact)
            .await
            .map_err(|e| DinnerError::Publish {
                event_type: "DinnerCreated.v1".to_string(),
                reason: e.to_string(),
            })?;

        info!(dinner_id = %dinner.id(), host_id = %dinner.host_id(), "dinner created");
        Ok(dinner)
    }

    /// Update a dinner's details and announce the new snapshot.
    ///
    /// # Errors
    ///
    /// [`DinnerError::NotFound`] for an unknown id,
    /// [`DinnerError::Validation`] for rejected fields,
    /// [`DinnerError::Publish`] if persisted but not announced.
    pub async fn update(&self, id: DinnerId, spec: NewDinner) -> Result<Dinner, DinnerError> {
        let mut dinner = self.load(id).await?;
        dinner.apply_update(&spec)?;
        self.repository.update(&dinner).await?;

        let fact = DinnerUpdated {
            dinner: dinner.snapshot(),
        };
        publish_fact(self.bus.as_ref(), &fact)
            .await
            .map_err(|e| DinnerError::Publish {
                event_type: "DinnerUpdated.v1".to_string(),
                reason: e.to_string(),
            })?;

        info!(dinner_id = %id, "dinner updated");
        Ok(dinner)
    }

    /// Move a dinner to a new time range.
    ///
    /// Rescheduling is an internal affair: no fact is published for it.
    ///
    /// # Errors
    ///
    /// [`DinnerError::NotFound`], [`DinnerError::InvalidStateTransition`]
    /// for completed dinners, [`DinnerError::Validation`] for a bad range.
    pub async fn reschedule(
        &self,
        id: DinnerId,
        new_start: chrono::DateTime<chrono::Utc>,
        new_end: chrono::DateTime<chrono::Utc>,
    ) -> Result<Dinner, DinnerError> {
        let mut dinner = self.load(id).await?;
        dinner.reschedule(new_start, new_end)?;
        self.repository.update(&dinner).await?;
        info!(dinner_id = %id, "dinner rescheduled");
        Ok(dinner)
    }

    /// Start a dinner and announce it to every reserved guest.
    ///
    /// The transition is committed first. The guest-id list is then fetched
    /// synchronously from the reservation service and `DinnerStarted` is
    /// published best-effort: if the lookup or the publish fails, the
    /// transition is kept, the fact is dropped with a warning, and nothing
    /// is retried.
    ///
    /// # Errors
    ///
    /// [`DinnerError::NotFound`] or [`DinnerError::InvalidStateTransition`];
    /// fact-publication problems are absorbed.
    pub async fn start(&self, id: DinnerId) -> Result<Dinner, DinnerError> {
        let mut dinner = self.load(id).await?;
        dinner.start(self.clock.now())?;
        self.repository.update(&dinner).await?;
        info!(dinner_id = %id, "dinner started");

        match self.guest_lists.guest_ids(id).await {
            Ok(guest_ids) => {
                let fact = DinnerStarted {
                    dinner: dinner.snapshot(),
                    guest_ids,
                };
                if let Err(e) = publish_fact(self.bus.as_ref(), &fact).await {
                    warn!(
                        dinner_id = %id,
                        error = %e,
                        "dinner started but DinnerStarted was not published"
                    );
                }
            }
            Err(e) => {
                warn!(
                    dinner_id = %id,
                    error = %e,
                    "guest list lookup failed, DinnerStarted not published"
                );
            }
        }

        Ok(dinner)
    }

    /// Complete a dinner and announce it to every reserved guest.
    ///
    /// Like [`DinnerLifecycle::start`], the guest-list lookup is
    /// best-effort: a lookup failure keeps the transition and skips the
    /// fact. A publish failure, however, is surfaced to the caller.
    ///
    /// # Errors
    ///
    /// [`DinnerError::NotFound`], [`DinnerError::InvalidStateTransition`],
    /// or [`DinnerError::Publish`].
    pub async fn complete(&self, id: DinnerId) -> Result<Dinner, DinnerError> {
        let mut dinner = self.load(id).await?;
        dinner.complete()?;
        self.repository.update(&dinner).await?;
        info!(dinner_id = %id, "dinner completed");

        match self.guest_lists.guest_ids(id).await {
            Ok(guest_ids) => {
                let fact = DinnerCompleted {
                    dinner: dinner.snapshot(),
                    guest_ids,
                };
                publish_fact(self.bus.as_ref(), &fact)
                    .await
                    .map_err(|e| DinnerError::Publish {
                        event_type: "DinnerCompleted.v1".to_string(),
                        reason: e.to_string(),
                    })?;
            }
            Err(e) => {
                warn!(
                    dinner_id = %id,
                    error = %e,
                    "guest list lookup failed, DinnerCompleted not published"
                );
            }
        }

        Ok(dinner)
    }

    /// Batch-start every upcoming dinner under a menu whose start time has
    /// passed. No per-dinner facts are published on this path.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::Storage`] on repository failure.
    pub async fn start_all_in_menu(&self, menu_id: MenuId) -> Result<Vec<Dinner>, DinnerError> {
        let now = self.clock.now();
        let upcoming = self
            .repository
            .find_by_menu_and_status(menu_id, DinnerStatus::Upcoming)
            .await?;

        let mut started = Vec::new();
        for mut dinner in upcoming {
            if now < dinner.start_time() {
                continue;
            }
            if dinner.start(now).is_ok() {
                self.repository.update(&dinner).await?;
                started.push(dinner);
            }
        }

        info!(menu_id = %menu_id, started = started.len(), "batch-started dinners in menu");
        Ok(started)
    }

    /// Fetch a dinner for read access.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::NotFound`] for an unknown id.
    pub async fn get(&self, id: DinnerId) -> Result<Dinner, DinnerError> {
        self.load(id).await
    }

    async fn load(&self, id: DinnerId) -> Result<Dinner, DinnerError> {
        self.repository
            .get(id)
            .await?
            .ok_or(DinnerError::NotFound(id))
    }
}
