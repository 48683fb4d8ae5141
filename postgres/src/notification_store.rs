//! PostgreSQL notification store.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tablehop_notification::domain::{
    Notification, NotificationChannel, NotificationStatus, NotificationUserType,
};
use tablehop_notification::store::{NotificationStore, StoreError};

/// Notification store backed by the `notifications` table.
///
/// `save` is an upsert on the notification id, so creation and the status
/// rewrites of send attempts go through the same statement. Rows are never
/// deleted; the table is the audit trail.
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    /// Create a store using the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_notification(row: &sqlx::postgres::PgRow) -> Result<Notification, StoreError> {
        let status: String = row.get("status");
        let channel: String = row.get("channel");
        let user_type: String = row.get("user_type");
        Ok(Notification {
            id: row.get("id"),
            user_id: row.get("user_id"),
            user_type: NotificationUserType::parse(&user_type)
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            email: row.get("email"),
            subject: row.get("subject"),
            description: row.get("description"),
            created_at: row.get("created_at"),
            delete_at: row.get("delete_at"),
            channel: NotificationChannel::parse(&channel)
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            status: NotificationStatus::parse(&status)
                .map_err(|e| StoreError::Backend(e.to_string()))?,
        })
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn save(&self, notification: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO notifications (
                id, user_id, user_type, email, subject, description,
                created_at, delete_at, channel, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                delete_at = EXCLUDED.delete_at
            ",
        )
        .bind(&notification.id)
        .bind(notification.user_id)
        .bind(notification.user_type.as_str())
        .bind(&notification.email)
        .bind(&notification.subject)
        .bind(&notification.description)
        .bind(notification.created_at)
        .bind(notification.delete_at)
        .bind(notification.channel.as_str())
        .bind(notification.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        tracing::debug!(
            notification_id = %notification.id,
            status = notification.status.as_str(),
            "notification persisted"
        );
        Ok(())
    }

    async fn find_pending(&self) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, user_type, email, subject, description,
                   created_at, delete_at, channel, status
            FROM notifications
            WHERE status = 'PENDING'
            ORDER BY created_at ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.iter().map(Self::row_to_notification).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<Notification>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, user_type, email, subject, description,
                   created_at, delete_at, channel, status
            FROM notifications
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.as_ref().map(Self::row_to_notification).transpose()
    }
}
