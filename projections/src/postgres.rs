//! `PostgreSQL` implementation of the saga read models.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE payment_promises (
//!     id TEXT PRIMARY KEY,
//!     order_id TEXT NOT NULL,
//!     user_id TEXT NOT NULL,
//!     amount BIGINT NOT NULL,
//!     due_date DATE NOT NULL,
//!     payment_mode TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//!
//! CREATE TABLE member_bills (
//!     id TEXT PRIMARY KEY,
//!     promise_id TEXT NOT NULL,
//!     user_id TEXT NOT NULL,
//!     amount BIGINT NOT NULL,
//!     status TEXT NOT NULL DEFAULT 'unpaid',
//!     issued_date DATE NOT NULL,
//!     paid_date DATE
//! );
//! ```
//!
//! Inserts are plain `INSERT`s: a primary-key conflict surfaces as
//! [`ProjectionError::Duplicate`]. The paid update is guarded by
//! `status = 'unpaid'`, so replays never move the paid date.

use chrono::{DateTime, NaiveDate, Utc};
use paysaga_core::projection::{
    BillStatus, BillUpdate, MemberBill, NewMemberBill, NewPaymentPromise, PaymentPromise,
    ProjectionError, ProjectionStore, Result,
};
use sqlx::FromRow;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;

/// PostgreSQL-backed promise and bill projections.
///
/// # Example
///
/// ```ignore
/// use paysaga_projections::PostgresProjectionStore;
///
/// let store = PostgresProjectionStore::new(pool);
/// store.migrate().await?;
///
/// let bills = store.bills_for_user("u1").await?;
/// ```
#[derive(Clone)]
pub struct PostgresProjectionStore {
    pool: PgPool,
}

impl PostgresProjectionStore {
    /// Create a projection store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a projection store with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Create the projection tables if they don't already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if migration fails.
    pub async fn migrate(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator
            .set_ignore_missing(true)
            .run(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct PromiseRow {
    id: String,
    order_id: String,
    user_id: String,
    amount: i64,
    due_date: NaiveDate,
    payment_mode: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PromiseRow> for PaymentPromise {
    type Error = ProjectionError;

    fn try_from(row: PromiseRow) -> Result<Self> {
        let payment_mode = row.payment_mode.parse().map_err(ProjectionError::Corrupt)?;
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            user_id: row.user_id,
            amount: row.amount,
            due_date: row.due_date,
            payment_mode,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct BillRow {
    id: String,
    promise_id: String,
    user_id: String,
    amount: i64,
    status: String,
    issued_date: NaiveDate,
    paid_date: Option<NaiveDate>,
}

impl TryFrom<BillRow> for MemberBill {
    type Error = ProjectionError;

    fn try_from(row: BillRow) -> Result<Self> {
        Ok(Self {
            status: row.status.parse::<BillStatus>()?,
            id: row.id,
            promise_id: row.promise_id,
            user_id: row.user_id,
            amount: row.amount,
            issued_date: row.issued_date,
            paid_date: row.paid_date,
        })
    }
}

fn insert_error(entity: &'static str, id: String, error: sqlx::Error) -> ProjectionError {
    match error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ProjectionError::Duplicate { entity, id }
        },
        other => ProjectionError::Storage(format!("Failed to insert {entity}: {other}")),
    }
}

impl ProjectionStore for PostgresProjectionStore {
    fn insert_promise(
        &self,
        promise: NewPaymentPromise,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO payment_promises
                    (id, order_id, user_id, amount, due_date, payment_mode, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, now())
                ",
            )
            .bind(&promise.id)
            .bind(&promise.order_id)
            .bind(&promise.user_id)
            .bind(promise.amount)
            .bind(promise.due_date)
            .bind(promise.payment_mode.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error("payment_promise", promise.id.clone(), e))?;

            tracing::debug!(promise_id = %promise.id, user_id = %promise.user_id, "Inserted payment promise");
            Ok(())
        })
    }

    fn insert_bill(
        &self,
        bill: NewMemberBill,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO member_bills
                    (id, promise_id, user_id, amount, status, issued_date, paid_date)
                VALUES ($1, $2, $3, $4, $5, $6, NULL)
                ",
            )
            .bind(&bill.id)
            .bind(&bill.promise_id)
            .bind(&bill.user_id)
            .bind(bill.amount)
            .bind(BillStatus::Unpaid.as_str())
            .bind(bill.issued_date)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error("member_bill", bill.id.clone(), e))?;

            tracing::debug!(bill_id = %bill.id, promise_id = %bill.promise_id, "Inserted member bill");
            Ok(())
        })
    }

    fn update_bill_paid(
        &self,
        bill_id: &str,
        paid_date: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<BillUpdate>> + Send + '_>> {
        let bill_id = bill_id.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE member_bills
                SET status = $1, paid_date = $2
                WHERE id = $3 AND status = $4
                ",
            )
            .bind(BillStatus::Paid.as_str())
            .bind(paid_date)
            .bind(&bill_id)
            .bind(BillStatus::Unpaid.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to mark bill paid: {e}")))?;

            Ok(if result.rows_affected() == 0 {
                BillUpdate::Unchanged
            } else {
                BillUpdate::MarkedPaid
            })
        })
    }

    fn promises_for_user(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PaymentPromise>>> + Send + '_>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let rows: Vec<PromiseRow> = sqlx::query_as(
                r"
                SELECT id, order_id, user_id, amount, due_date, payment_mode, created_at
                FROM payment_promises
                WHERE user_id = $1
                ORDER BY created_at, id
                ",
            )
            .bind(&user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to load promises: {e}")))?;

            rows.into_iter().map(PaymentPromise::try_from).collect()
        })
    }

    fn bills_for_user(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MemberBill>>> + Send + '_>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let rows: Vec<BillRow> = sqlx::query_as(
                r"
                SELECT id, promise_id, user_id, amount, status, issued_date, paid_date
                FROM member_bills
                WHERE user_id = $1
                ORDER BY issued_date, id
                ",
            )
            .bind(&user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to load bills: {e}")))?;

            rows.into_iter().map(MemberBill::try_from).collect()
        })
    }
}
