//! PostgreSQL-backed stores for the Tablehop notification service.
//!
//! Implements the notification service's storage traits
//! ([`NotificationStore`](tablehop_notification::NotificationStore) and
//! [`IdentityStore`](tablehop_notification::IdentityStore)) over sqlx so the
//! dispatch engine survives restarts with its audit trail and identity
//! projection intact. The in-memory implementations remain the default for
//! tests and single-process wiring.
//!
//! Queries use sqlx's runtime API (no compile-time database); the schema is
//! shipped as [`schema.sql`](../schema.sql).
//!
//! # Example
//!
//! ```ignore
//! use tablehop_postgres::{PgIdentityStore, PgNotificationStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = sqlx::PgPool::connect("postgres://localhost/tablehop").await?;
//!     let notifications = PgNotificationStore::new(pool.clone());
//!     let identities = PgIdentityStore::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod identity_store;
mod notification_store;

pub use identity_store::PgIdentityStore;
pub use notification_store::PgNotificationStore;
