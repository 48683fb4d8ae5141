//! The Notification record.
//!
//! Notifications are an audit trail: created `Pending`, moved to `Sent` or
//! `Failed` by send attempts, never deleted.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A string that does not name a known status/channel/user type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// Which enum failed to parse.
    pub kind: &'static str,
    /// The offending value.
    pub value: String,
}

/// Delivery channel of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationChannel {
    /// Delivered to the recipient's email address.
    Email,
    /// Delivered as a mobile push notification.
    Push,
    /// Surfaced inside the application.
    InApp,
}

impl NotificationChannel {
    /// Stable string form, used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Push => "PUSH",
            Self::InApp => "IN_APP",
        }
    }

    /// Parse the storage string form.
    ///
    /// # Errors
    ///
    /// Returns [`ParseEnumError`] for unknown values.
    pub fn parse(value: &str) -> Result<Self, ParseEnumError> {
        match value {
            "EMAIL" => Ok(Self::Email),
            "PUSH" => Ok(Self::Push),
            "IN_APP" => Ok(Self::InApp),
            _ => Err(ParseEnumError {
                kind: "notification channel",
                value: value.to_string(),
            }),
        }
    }
}

/// Delivery status of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationStatus {
    /// Created, awaiting a send attempt (or a sweep retry).
    Pending,
    /// Delivered by the channel adapter.
    Sent,
    /// A send attempt failed or the record was not ready; not revisited.
    Failed,
}

impl NotificationStatus {
    /// Stable string form, used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    /// Parse the storage string form.
    ///
    /// # Errors
    ///
    /// Returns [`ParseEnumError`] for unknown values.
    pub fn parse(value: &str) -> Result<Self, ParseEnumError> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            _ => Err(ParseEnumError {
                kind: "notification status",
                value: value.to_string(),
            }),
        }
    }
}

/// Which kind of user a notification is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationUserType {
    /// A guest account.
    Guest,
    /// A host account.
    Host,
    /// Neither projection knows the user.
    Unknown,
}

impl NotificationUserType {
    /// Stable string form, used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "GUEST",
            Self::Host => "HOST",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse the storage string form.
    ///
    /// # Errors
    ///
    /// Returns [`ParseEnumError`] for unknown values.
    pub fn parse(value: &str) -> Result<Self, ParseEnumError> {
        match value {
            "GUEST" => Ok(Self::Guest),
            "HOST" => Ok(Self::Host),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(ParseEnumError {
                kind: "notification user type",
                value: value.to_string(),
            }),
        }
    }
}

/// A notification addressed to one recipient.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// Unique id (UUID v4, textual).
    pub id: String,
    /// Recipient's user id.
    pub user_id: i64,
    /// Whether the recipient is a guest, a host, or unknown.
    pub user_type: NotificationUserType,
    /// Recipient's email address; empty means the record can never send.
    pub email: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub description: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Optional retention horizon. Records are kept regardless; this only
    /// marks when a cleanup job could drop them.
    pub delete_at: Option<DateTime<Utc>>,
    /// Delivery channel.
    pub channel: NotificationChannel,
    /// Delivery status.
    pub status: NotificationStatus,
}

impl Notification {
    /// Whether a send attempt may be made: a non-empty email address and
    /// `Pending` status, nothing else.
    #[must_use]
    pub fn is_ready_to_send(&self) -> bool {
        !self.email.is_empty() && self.status == NotificationStatus::Pending
    }

    /// Mark the notification delivered.
    #[must_use]
    pub fn mark_sent(mut self) -> Self {
        self.status = NotificationStatus::Sent;
        self
    }

    /// Mark the notification failed.
    #[must_use]
    pub fn mark_failed(mut self) -> Self {
        self.status = NotificationStatus::Failed;
        self
    }
}
