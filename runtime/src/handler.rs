//! The handler trait driven by [`FactConsumer`](crate::FactConsumer).

use async_trait::async_trait;
use tablehop_core::envelope::FactEnvelope;

/// Error type handlers report back to the consumer.
///
/// Deliberately wide: the consumer only needs `Display` for logging and
/// dead-letter metadata, and services already have their own thiserror
/// enums that convert via `?`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes one fact envelope at a time.
///
/// Implementors deserialize the payload with
/// [`FactEnvelope::decode`](tablehop_core::envelope::FactEnvelope::decode),
/// apply their business logic, and return `Ok(())` to commit progress.
/// Returning an error triggers the consumer's retry policy and, once
/// exhausted, dead-letter routing.
///
/// # Idempotency
///
/// The bus is at-least-once; a handler may see the same envelope more than
/// once and must not corrupt state when it does.
#[async_trait]
pub trait FactHandler: Send + Sync + 'static {
    /// Handle one envelope.
    ///
    /// # Errors
    ///
    /// Return an error for failures that should be retried and eventually
    /// dead-lettered: malformed payloads, missing upstream references,
    /// storage faults. Failures a service absorbs into its own state (e.g. a
    /// notification marked FAILED) must not surface here, otherwise the bus
    /// retry machinery would see them.
    async fn handle(&self, envelope: &FactEnvelope) -> Result<(), HandlerError>;
}
