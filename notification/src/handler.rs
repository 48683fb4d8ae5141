//! Bus-facing handler routing facts into the dispatch engine.

use crate::engine::DispatchEngine;
use async_trait::async_trait;
use std::sync::Arc;
use tablehop_core::envelope::FactEnvelope;
use tablehop_core::fact::{
    DinnerCompleted, DinnerStarted, Fact, InvoiceCreated, ReservationCanceled, ReservationCreated,
    topics,
};
use tablehop_runtime::{FactHandler, HandlerError};
use tracing::debug;

/// Routes envelopes by event type to the matching engine handler.
///
/// Undecodable payloads and hard engine errors (unknown single-target
/// recipients, storage faults) propagate, so the consumer runtime retries
/// and eventually dead-letters them. Event types this service does not care
/// about are acknowledged silently.
pub struct DispatchHandler {
    engine: Arc<DispatchEngine>,
}

impl DispatchHandler {
    /// Create a handler feeding `engine`.
    #[must_use]
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self { engine }
    }

    /// Topics this handler consumes.
    #[must_use]
    pub fn topics() -> Vec<String> {
        vec![
            topics::RESERVATION_CREATED.to_string(),
            topics::RESERVATION_CANCELED.to_string(),
            topics::INVOICE_CREATED.to_string(),
            topics::DINNER_STARTED.to_string(),
            topics::DINNER_COMPLETED.to_string(),
        ]
    }
}

#[async_trait]
impl FactHandler for DispatchHandler {
    async fn handle(&self, envelope: &FactEnvelope) -> Result<(), HandlerError> {
        match envelope.event_type.as_str() {
            t if t == ReservationCreated::EVENT_TYPE => {
                self.engine
                    .on_reservation_created(&envelope.decode()?)
                    .await?;
            }
            t if t == ReservationCanceled::EVENT_TYPE => {
                self.engine
                    .on_reservation_canceled(&envelope.decode()?)
                    .await?;
            }
            t if t == InvoiceCreated::EVENT_TYPE => {
                self.engine.on_invoice_created(&envelope.decode()?).await?;
            }
            t if t == DinnerStarted::EVENT_TYPE => {
                self.engine.on_dinner_started(&envelope.decode()?).await?;
            }
            t if t == DinnerCompleted::EVENT_TYPE => {
                self.engine.on_dinner_completed(&envelope.decode()?).await?;
            }
            other => {
                debug!(event_type = %other, "ignoring fact outside the dispatch engine");
            }
        }
        Ok(())
    }
}
