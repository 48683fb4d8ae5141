//! Read-only dinner projection.
//!
//! A denormalized copy of dinner snapshots keyed by dinner id, upserted
//! asynchronously from `DinnerCreated` facts. Used only to enrich
//! reservation read responses; the authoritative dinner state lives in the
//! dinner service. Redelivered facts simply overwrite the row, so the
//! handler is idempotent by construction.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tablehop_core::envelope::FactEnvelope;
use tablehop_core::fact::{DinnerCreated, DinnerId, DinnerSnapshot, Fact};
use tablehop_runtime::{FactHandler, HandlerError};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::ReservationError;

/// Storage boundary for the dinner projection.
#[async_trait]
pub trait DinnerProjectionStore: Send + Sync {
    /// Insert or overwrite the snapshot for its dinner id.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Storage`] on storage failure.
    async fn upsert(&self, snapshot: DinnerSnapshot) -> Result<(), ReservationError>;

    /// Fetch the snapshot for a dinner, if the projection has caught up.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Storage`] on storage failure.
    async fn get(&self, dinner_id: DinnerId) -> Result<Option<DinnerSnapshot>, ReservationError>;
}

/// In-memory dinner projection for tests and single-process wiring.
#[derive(Default)]
pub struct InMemoryDinnerProjection {
    dinners: Mutex<HashMap<i64, DinnerSnapshot>>,
}

impl InMemoryDinnerProjection {
    /// Create an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DinnerProjectionStore for InMemoryDinnerProjection {
    async fn upsert(&self, snapshot: DinnerSnapshot) -> Result<(), ReservationError> {
        self.dinners.lock().await.insert(snapshot.id.0, snapshot);
        Ok(())
    }

    async fn get(&self, dinner_id: DinnerId) -> Result<Option<DinnerSnapshot>, ReservationError> {
        Ok(self.dinners.lock().await.get(&dinner_id.0).cloned())
    }
}

/// Consumes dinner lifecycle facts into the projection.
pub struct DinnerProjectionHandler {
    store: Arc<dyn DinnerProjectionStore>,
}

impl DinnerProjectionHandler {
    /// Create a handler writing into `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DinnerProjectionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FactHandler for DinnerProjectionHandler {
    async fn handle(&self, envelope: &FactEnvelope) -> Result<(), HandlerError> {
        if envelope.event_type != DinnerCreated::EVENT_TYPE {
            debug!(event_type = %envelope.event_type, "ignoring fact outside the dinner projection");
            return Ok(());
        }

        let fact: DinnerCreated = envelope.decode()?;
        let dinner_id = fact.dinner.id;
        self.store.upsert(fact.dinner).await?;
        info!(dinner_id = %dinner_id, "dinner projection updated");
        Ok(())
    }
}
