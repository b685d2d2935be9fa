//! `PostgreSQL` event log for paysaga.
//!
//! [`PostgresEventLog`] implements the `EventLog` trait from `paysaga-core`
//! on top of a single append-only table:
//!
//! ```sql
//! CREATE TABLE events (
//!     id UUID PRIMARY KEY,
//!     event_type TEXT NOT NULL,
//!     event_data BYTEA NOT NULL,
//!     recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```
//!
//! # Example
//!
//! ```ignore
//! use paysaga_postgres::PostgresEventLog;
//!
//! let log = PostgresEventLog::connect("postgres://localhost/paysaga", 5).await?;
//! log.migrate().await?;
//! log.append(EventType::PurchaseCompleted, &raw).await?;
//! ```

use chrono::{DateTime, Utc};
use paysaga_core::event::EventType;
use paysaga_core::event_log::{EventLog, EventLogEntry, EventLogError, EventLogId};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// PostgreSQL-backed [`EventLog`].
#[derive(Clone)]
pub struct PostgresEventLog {
    pool: PgPool,
}

impl PostgresEventLog {
    /// Create an event log using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, EventLogError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| EventLogError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Create the `events` table if it does not exist.
    ///
    /// Migrations of other crates may share the database, so versions this
    /// crate does not know about are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Database`] if migration fails.
    pub async fn migrate(&self) -> Result<(), EventLogError> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator
            .set_ignore_missing(true)
            .run(&self.pool)
            .await
            .map_err(|e| EventLogError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The most recent entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Database`] if the query fails.
    pub async fn recent(&self, limit: i64) -> Result<Vec<EventLogEntry>, EventLogError> {
        let rows: Vec<(Uuid, String, Vec<u8>, DateTime<Utc>)> = sqlx::query_as(
            r"
            SELECT id, event_type, event_data, recorded_at
            FROM events
            ORDER BY recorded_at DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EventLogError::Database(format!("Failed to load events: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(id, event_type, payload, recorded_at)| EventLogEntry {
                id: EventLogId::from_uuid(id),
                event_type,
                payload,
                recorded_at,
            })
            .collect())
    }
}

impl EventLog for PostgresEventLog {
    fn append(
        &self,
        event_type: EventType,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<EventLogId, EventLogError>> + Send + '_>> {
        let payload = payload.to_vec();
        Box::pin(async move {
            let id = EventLogId::generate();

            sqlx::query(
                r"
                INSERT INTO events (id, event_type, event_data, recorded_at)
                VALUES ($1, $2, $3, now())
                ",
            )
            .bind(id.as_uuid())
            .bind(event_type.as_str())
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                metrics::counter!("paysaga_event_log_insert_errors_total").increment(1);
                EventLogError::Database(format!("Failed to append event: {e}"))
            })?;

            tracing::debug!(log_id = %id, %event_type, "Event appended to log");
            Ok(id)
        })
    }
}
