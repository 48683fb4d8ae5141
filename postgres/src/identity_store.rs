//! PostgreSQL identity projection store.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tablehop_core::fact::{GuestId, HostId};
use tablehop_notification::identity::{GuestRecord, HostRecord, IdentityStore};
use tablehop_notification::store::StoreError;

/// Identity projection backed by the `guests` and `hosts` tables.
///
/// Upserts are last-write-wins on the user id, matching the projection's
/// redelivery contract.
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    /// Create a store using the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn upsert_guest(&self, guest: GuestRecord) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO guests (id, name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email
            ",
        )
        .bind(guest.id.0)
        .bind(&guest.name)
        .bind(&guest.email)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn upsert_host(&self, host: HostRecord) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO hosts (id, name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email
            ",
        )
        .bind(host.id.0)
        .bind(&host.name)
        .bind(&host.email)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn guest(&self, id: GuestId) -> Result<Option<GuestRecord>, StoreError> {
        let row = sqlx::query("SELECT id, name, email FROM guests WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(row.map(|row| GuestRecord {
            id: GuestId(row.get("id")),
            name: row.get("name"),
            email: row.get("email"),
        }))
    }

    async fn host(&self, id: HostId) -> Result<Option<HostRecord>, StoreError> {
        let row = sqlx::query("SELECT id, name, email FROM hosts WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(row.map(|row| HostRecord {
            id: HostId(row.get("id")),
            name: row.get("name"),
            email: row.get("email"),
        }))
    }
}
