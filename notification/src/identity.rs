//! Identity projection: local guest and host lookup copies.
//!
//! The dispatch engine never calls the identity service. It resolves
//! recipients from these rows, which are kept current by consuming
//! `GuestCreated` and `HostCreated` facts. Upserts are last-write-wins, so
//! redelivery simply overwrites a row with identical data.

use crate::store::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tablehop_core::envelope::FactEnvelope;
use tablehop_core::fact::{Fact, GuestCreated, GuestId, HostCreated, HostId};
use tablehop_runtime::{FactHandler, HandlerError};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Local copy of a guest's contact data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestRecord {
    /// Guest id.
    pub id: GuestId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}

/// Local copy of a host's contact data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostRecord {
    /// Host id.
    pub id: HostId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}

/// Storage for the identity projection. The projection handler is the only
/// writer; the dispatch engine only reads.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert or overwrite a guest row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    async fn upsert_guest(&self, guest: GuestRecord) -> Result<(), StoreError>;

    /// Insert or overwrite a host row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    async fn upsert_host(&self, host: HostRecord) -> Result<(), StoreError>;

    /// Look up a guest.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    async fn guest(&self, id: GuestId) -> Result<Option<GuestRecord>, StoreError>;

    /// Look up a host.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on storage failure.
    async fn host(&self, id: HostId) -> Result<Option<HostRecord>, StoreError>;
}

/// In-memory identity projection for tests and single-process wiring.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    guests: Mutex<HashMap<i64, GuestRecord>>,
    hosts: Mutex<HashMap<i64, HostRecord>>,
}

impl InMemoryIdentityStore {
    /// Create an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn upsert_guest(&self, guest: GuestRecord) -> Result<(), StoreError> {
        self.guests.lock().await.insert(guest.id.0, guest);
        Ok(())
    }

    async fn upsert_host(&self, host: HostRecord) -> Result<(), StoreError> {
        self.hosts.lock().await.insert(host.id.0, host);
        Ok(())
    }

    async fn guest(&self, id: GuestId) -> Result<Option<GuestRecord>, StoreError> {
        Ok(self.guests.lock().await.get(&id.0).cloned())
    }

    async fn host(&self, id: HostId) -> Result<Option<HostRecord>, StoreError> {
        Ok(self.hosts.lock().await.get(&id.0).cloned())
    }
}

/// Consumes identity-creation facts into the projection.
pub struct IdentityProjectionHandler {
    store: Arc<dyn IdentityStore>,
}

impl IdentityProjectionHandler {
    /// Create a handler writing into `store`.
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FactHandler for IdentityProjectionHandler {
    async fn handle(&self, envelope: &FactEnvelope) -> Result<(), HandlerError> {
        match envelope.event_type.as_str() {
            t if t == GuestCreated::EVENT_TYPE => {
                let fact: GuestCreated = envelope.decode()?;
                info!(guest_id = %fact.id, email = %fact.email, "guest projected locally");
                self.store
                    .upsert_guest(GuestRecord {
                        id: fact.id,
                        name: fact.name,
                        email: fact.email,
                    })
                    .await?;
            }
            t if t == HostCreated::EVENT_TYPE => {
                let fact: HostCreated = envelope.decode()?;
                info!(host_id = %fact.id, email = %fact.email, "host projected locally");
                self.store
                    .upsert_host(HostRecord {
                        id: fact.id,
                        name: fact.name,
                        email: fact.email,
                    })
                    .await?;
            }
            other => {
                debug!(event_type = %other, "ignoring fact outside the identity projection");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[tokio::test]
    async fn guest_upserts_are_idempotent() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let handler = IdentityProjectionHandler::new(store.clone());

        let fact = GuestCreated {
            id: GuestId(5),
            name: "Nora".to_string(),
            email: "nora@example.com".to_string(),
        };
        let envelope = FactEnvelope::from_fact(&fact).expect("encodable");

        handler.handle(&envelope).await.expect("first delivery");
        handler.handle(&envelope).await.expect("redelivery overwrites");

        let row = store.guest(GuestId(5)).await.expect("read").expect("row");
        assert_eq!(row.email, "nora@example.com");
    }

    #[tokio::test]
    async fn later_facts_win() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let handler = IdentityProjectionHandler::new(store.clone());

        for email in ["old@example.com", "new@example.com"] {
            let fact = HostCreated {
                id: HostId(2),
                name: "Karim".to_string(),
                email: email.to_string(),
            };
            let envelope = FactEnvelope::from_fact(&fact).expect("encodable");
            handler.handle(&envelope).await.expect("delivery");
        }

        let row = store.host(HostId(2)).await.expect("read").expect("row");
        assert_eq!(row.email, "new@example.com");
    }
}
