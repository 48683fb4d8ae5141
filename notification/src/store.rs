//! Persistence boundary for notification records.

use crate::domain::{Notification, NotificationStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

/// A persistence adapter failure.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store rejected or lost the operation.
    #[error("store failure: {0}")]
    Backend(String),
}

/// Storage for notification records.
///
/// `save` doubles as insert and update: notifications are keyed by id and
/// their status is rewritten in place by send attempts. Records are never
/// deleted.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert or overwrite a notification by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    async fn save(&self, notification: &Notification) -> Result<(), StoreError>;

    /// All `Pending` notifications, oldest `created_at` first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    async fn find_pending(&self) -> Result<Vec<Notification>, StoreError>;

    /// Fetch a notification by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    async fn get(&self, id: &str) -> Result<Option<Notification>, StoreError>;
}

/// In-memory notification store for tests and single-process wiring.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    notifications: Mutex<HashMap<String, Notification>>,
}

impl InMemoryNotificationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, for assertions in tests.
    pub async fn all(&self) -> Vec<Notification> {
        let mut all: Vec<Notification> = self.notifications.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn save(&self, notification: &Notification) -> Result<(), StoreError> {
        self.notifications
            .lock()
            .await
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn find_pending(&self) -> Result<Vec<Notification>, StoreError> {
        let mut pending: Vec<Notification> = self
            .notifications
            .lock()
            .await
            .values()
            .filter(|n| n.status == NotificationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn get(&self, id: &str) -> Result<Option<Notification>, StoreError> {
        Ok(self.notifications.lock().await.get(id).cloned())
    }
}
