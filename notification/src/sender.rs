//! Channel adapters for notification delivery.
//!
//! The real marketplace delivers through an email provider and a push
//! gateway. Those integrations live outside this service; the adapters here
//! simulate delivery and log it, which is also exactly what the tests need.

use crate::domain::{Notification, NotificationChannel};
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// A channel adapter failure.
///
/// Absorbed by the engine into `status = FAILED`; never propagated to the
/// bus machinery.
#[derive(Error, Debug, Clone)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// A delivery channel adapter.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Attempt to deliver the notification.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the channel rejects the delivery.
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Simulated email delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmailSender;

#[async_trait]
impl NotificationSender for EmailSender {
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            email = %notification.email,
            subject = %notification.subject,
            "email delivered"
        );
        Ok(())
    }
}

/// Simulated push delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct PushSender;

#[async_trait]
impl NotificationSender for PushSender {
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            user_id = notification.user_id,
            subject = %notification.subject,
            "push notification delivered"
        );
        Ok(())
    }
}

/// Simulated in-app delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct InAppSender;

#[async_trait]
impl NotificationSender for InAppSender {
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            user_id = notification.user_id,
            subject = %notification.subject,
            "in-app notification delivered"
        );
        Ok(())
    }
}

/// Routes each notification to the adapter for its channel.
pub struct ChannelRouter {
    email: Box<dyn NotificationSender>,
    push: Box<dyn NotificationSender>,
    in_app: Box<dyn NotificationSender>,
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRouter {
    /// Router over the simulated adapters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            email: Box::new(EmailSender),
            push: Box::new(PushSender),
            in_app: Box::new(InAppSender),
        }
    }

    /// Router over explicit adapters, for tests or real integrations.
    #[must_use]
    pub fn with_adapters(
        email: Box<dyn NotificationSender>,
        push: Box<dyn NotificationSender>,
        in_app: Box<dyn NotificationSender>,
    ) -> Self {
        Self { email, push, in_app }
    }
}

#[async_trait]
impl NotificationSender for ChannelRouter {
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        match notification.channel {
            NotificationChannel::Email => self.email.send(notification).await,
            NotificationChannel::Push => self.push.send(notification).await,
            NotificationChannel::InApp => self.in_app.send(notification).await,
        }
    }
}
