//! Read models of payment promises and member bills.
//!
//! # Overview
//!
//! Projections are the query side of the saga. They are mutated only by the
//! choreographer, one row at a time, and read by the status page:
//!
//! ```text
//! PaymentPromiseCreated ──► insert_promise ──► payment_promises
//! MemberBillCreated     ──► insert_bill    ──► member_bills (unpaid)
//! PaymentCompleted      ──► update_bill_paid ─► member_bills (paid)
//! ```
//!
//! Writes are not transactional with the event log. Under at-least-once
//! delivery the same event can arrive twice:
//!
//! - inserts fail with [`ProjectionError::Duplicate`], which callers log and ignore
//! - [`ProjectionStore::update_bill_paid`] only touches unpaid rows, so a
//!   repeated payment leaves the row as it was
//!
//! # Implementations
//!
//! - `PostgresProjectionStore` (in `paysaga-projections`)
//! - `InMemoryProjectionStore` (in `paysaga-testing`)

use crate::event::{MemberBillCreated, PaymentMode, PaymentPromiseCreated};
use crate::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

/// Error type for projection operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// A row with this identifier already exists.
    #[error("{entity} {id} already exists")]
    Duplicate {
        /// Which read model (`payment_promise` or `member_bill`).
        entity: &'static str,
        /// The conflicting identifier.
        id: String,
    },

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored row could not be mapped back into its model.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Settlement state of a member bill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    /// Issued, not yet paid.
    Unpaid,
    /// Paid; terminal.
    Paid,
}

impl BillStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillStatus {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unpaid" => Ok(Self::Unpaid),
            "paid" => Ok(Self::Paid),
            other => Err(ProjectionError::Corrupt(format!("unknown bill status: {other}"))),
        }
    }
}

/// A promise row as read back from the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPromise {
    /// Promise identifier.
    pub id: String,
    /// Order the promise settles.
    pub order_id: String,
    /// Member who owes the amount.
    pub user_id: String,
    /// Promised amount; never changes after insert.
    pub amount: i64,
    /// Payment deadline.
    pub due_date: NaiveDate,
    /// Billing mode.
    pub payment_mode: PaymentMode,
    /// Set by the store on insert.
    pub created_at: DateTime<Utc>,
}

/// Values for a new promise row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPaymentPromise {
    /// Promise identifier.
    pub id: String,
    /// Order the promise settles.
    pub order_id: String,
    /// Member who owes the amount.
    pub user_id: String,
    /// Promised amount.
    pub amount: i64,
    /// Payment deadline.
    pub due_date: NaiveDate,
    /// Billing mode.
    pub payment_mode: PaymentMode,
}

impl From<PaymentPromiseCreated> for NewPaymentPromise {
    fn from(event: PaymentPromiseCreated) -> Self {
        Self {
            id: event.promise_id,
            order_id: event.order_id,
            user_id: event.user_id,
            amount: event.amount,
            due_date: event.due_date,
            payment_mode: event.payment_mode,
        }
    }
}

/// A bill row as read back from the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBill {
    /// Bill identifier (minted upstream).
    pub id: String,
    /// Promise the bill collects.
    pub promise_id: String,
    /// Billed member.
    pub user_id: String,
    /// Billed amount; never changes after insert.
    pub amount: i64,
    /// Settlement state.
    pub status: BillStatus,
    /// Issue date.
    pub issued_date: NaiveDate,
    /// Present once the bill is paid.
    pub paid_date: Option<NaiveDate>,
}

/// Values for a new bill row. New bills are always unpaid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMemberBill {
    /// Bill identifier.
    pub id: String,
    /// Promise the bill collects.
    pub promise_id: String,
    /// Billed member.
    pub user_id: String,
    /// Billed amount.
    pub amount: i64,
    /// Issue date.
    pub issued_date: NaiveDate,
}

impl From<MemberBillCreated> for NewMemberBill {
    fn from(event: MemberBillCreated) -> Self {
        Self {
            id: event.bill_id,
            promise_id: event.promise_id,
            user_id: event.user_id,
            amount: event.amount,
            issued_date: event.issued_date,
        }
    }
}

impl NewMemberBill {
    /// The row as it reads right after insert.
    #[must_use]
    pub fn into_unpaid(self) -> MemberBill {
        MemberBill {
            id: self.id,
            promise_id: self.promise_id,
            user_id: self.user_id,
            amount: self.amount,
            status: BillStatus::Unpaid,
            issued_date: self.issued_date,
            paid_date: None,
        }
    }
}

/// Outcome of [`ProjectionStore::update_bill_paid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BillUpdate {
    /// An unpaid bill was marked paid.
    MarkedPaid,
    /// No unpaid bill matched: unknown id or already paid.
    Unchanged,
}

/// Storage for the promise and bill read models.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn ProjectionStore>`).
pub trait ProjectionStore: Send + Sync {
    /// Insert a promise row.
    ///
    /// # Errors
    ///
    /// - [`ProjectionError::Duplicate`] if a promise with this id exists
    /// - [`ProjectionError::Storage`] on backend failure
    fn insert_promise(
        &self,
        promise: NewPaymentPromise,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Insert an unpaid bill row.
    ///
    /// # Errors
    ///
    /// - [`ProjectionError::Duplicate`] if a bill with this id exists
    /// - [`ProjectionError::Storage`] on backend failure
    fn insert_bill(
        &self,
        bill: NewMemberBill,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Mark an unpaid bill as paid on `paid_date`.
    ///
    /// A missing or already-paid bill is not an error; the call reports
    /// [`BillUpdate::Unchanged`] and leaves the row untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn update_bill_paid(
        &self,
        bill_id: &str,
        paid_date: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<BillUpdate>> + Send + '_>>;

    /// All promises of a member, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the query fails or a row cannot be mapped.
    fn promises_for_user(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PaymentPromise>>> + Send + '_>>;

    /// All bills of a member, by issue date.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the query fails or a row cannot be mapped.
    fn bills_for_user(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MemberBill>>> + Send + '_>>;
}
