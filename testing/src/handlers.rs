//! Fact handlers for exercising the consumer runtime.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tablehop_core::envelope::FactEnvelope;
use tablehop_runtime::{FactHandler, HandlerError};
use tokio::sync::Mutex;

/// Records every envelope it handles.
#[derive(Default)]
pub struct RecordingHandler {
    seen: Arc<Mutex<Vec<FactEnvelope>>>,
}

impl RecordingHandler {
    /// Create an empty recording handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the envelopes handled so far, in arrival order.
    pub async fn seen(&self) -> Vec<FactEnvelope> {
        self.seen.lock().await.clone()
    }

    /// Wait until at least `count` envelopes were handled.
    ///
    /// Polls every 10ms; wrap in `tokio::time::timeout` to bound the wait.
    pub async fn wait_for(&self, count: usize) {
        loop {
            if self.seen.lock().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl FactHandler for RecordingHandler {
    async fn handle(&self, envelope: &FactEnvelope) -> Result<(), HandlerError> {
        self.seen.lock().await.push(envelope.clone());
        Ok(())
    }
}

/// Fails every delivery, counting the attempts.
///
/// Used to assert the retry-then-dead-letter contract.
#[derive(Default)]
pub struct FailingHandler {
    attempts: AtomicUsize,
}

impl FailingHandler {
    /// Create a handler that always fails.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of times the handler was invoked.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FactHandler for FailingHandler {
    async fn handle(&self, _envelope: &FactEnvelope) -> Result<(), HandlerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err("handler always fails".into())
    }
}
