//! In-memory projection testing utilities
//!
//! [`InMemoryProjectionStore`] keeps promises and bills in insertion order
//! and enforces the same rules as the Postgres store:
//! - duplicate ids are rejected with [`ProjectionError::Duplicate`]
//! - only unpaid bills can be marked paid

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use chrono::{DateTime, NaiveDate, Utc};
use paysaga_core::projection::{
    BillStatus, BillUpdate, MemberBill, NewMemberBill, NewPaymentPromise, PaymentPromise,
    ProjectionError, ProjectionStore, Result,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Tables {
    promises: Vec<PaymentPromise>,
    bills: Vec<MemberBill>,
}

/// In-memory projection store for fast, deterministic testing.
///
/// # Example
///
/// ```
/// use paysaga_testing::InMemoryProjectionStore;
/// use paysaga_core::projection::{NewMemberBill, ProjectionStore, BillUpdate};
/// use chrono::NaiveDate;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryProjectionStore::new();
/// let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
///
/// store.insert_bill(NewMemberBill {
///     id: "b1".into(),
///     promise_id: "p1".into(),
///     user_id: "u1".into(),
///     amount: 3500,
///     issued_date: day,
/// }).await?;
///
/// assert_eq!(store.update_bill_paid("b1", day).await?, BillUpdate::MarkedPaid);
/// assert_eq!(store.update_bill_paid("b1", day).await?, BillUpdate::Unchanged);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryProjectionStore {
    tables: Arc<RwLock<Tables>>,
    created_at: DateTime<Utc>,
    failing: Arc<AtomicBool>,
}

impl InMemoryProjectionStore {
    /// Create a new empty store; rows are stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_created_at(Utc::now())
    }

    /// Create a store that stamps every promise with `created_at`.
    #[must_use]
    pub fn with_created_at(created_at: DateTime<Utc>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            created_at,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every following operation fail with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of all promises in insertion order.
    #[must_use]
    pub fn promises(&self) -> Vec<PaymentPromise> {
        self.tables.read().unwrap().promises.clone()
    }

    /// Snapshot of all bills in insertion order.
    #[must_use]
    pub fn bills(&self) -> Vec<MemberBill> {
        self.tables.read().unwrap().bills.clone()
    }

    /// Look up one bill.
    #[must_use]
    pub fn bill(&self, bill_id: &str) -> Option<MemberBill> {
        self.tables
            .read()
            .unwrap()
            .bills
            .iter()
            .find(|b| b.id == bill_id)
            .cloned()
    }

    /// Clear all rows (for test isolation)
    pub fn clear(&self) {
        let mut tables = self.tables.write().unwrap();
        tables.promises.clear();
        tables.bills.clear();
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProjectionError::Storage("projection store unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryProjectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectionStore for InMemoryProjectionStore {
    fn insert_promise(
        &self,
        promise: NewPaymentPromise,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().unwrap();
            if tables.promises.iter().any(|p| p.id == promise.id) {
                return Err(ProjectionError::Duplicate {
                    entity: "payment_promise",
                    id: promise.id,
                });
            }
            tables.promises.push(PaymentPromise {
                id: promise.id,
                order_id: promise.order_id,
                user_id: promise.user_id,
                amount: promise.amount,
                due_date: promise.due_date,
                payment_mode: promise.payment_mode,
                created_at: self.created_at,
            });
            Ok(())
        })
    }

    fn insert_bill(
        &self,
        bill: NewMemberBill,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write().unwrap();
            if tables.bills.iter().any(|b| b.id == bill.id) {
                return Err(ProjectionError::Duplicate {
                    entity: "member_bill",
                    id: bill.id,
                });
            }
            tables.bills.push(bill.into_unpaid());
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
            self.check_available()?;
            let mut tables = self.tables.write().unwrap();
            let unpaid = tables
                .bills
                .iter_mut()
                .find(|b| b.id == bill_id && b.status == BillStatus::Unpaid);
            Ok(match unpaid {
                Some(bill) => {
                    bill.status = BillStatus::Paid;
                    bill.paid_date = Some(paid_date);
                    BillUpdate::MarkedPaid
                },
                None => BillUpdate::Unchanged,
            })
        })
    }

    fn promises_for_user(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PaymentPromise>>> + Send + '_>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.check_available()?;
            Ok(self
                .tables
                .read()
                .unwrap()
                .promises
                .iter()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect())
        })
    }

    fn bills_for_user(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MemberBill>>> + Send + '_>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.check_available()?;
            let mut bills: Vec<MemberBill> = self
                .tables
                .read()
                .unwrap()
                .bills
                .iter()
                .filter(|b| b.user_id == user_id)
                .cloned()
                .collect();
            bills.sort_by_key(|b| b.issued_date);
            Ok(bills)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysaga_core::event::PaymentMode;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    fn promise(id: &str, user: &str) -> NewPaymentPromise {
        NewPaymentPromise {
            id: id.to_string(),
            order_id: format!("order-{user}"),
            user_id: user.to_string(),
            amount: 3500,
            due_date: day(28),
            payment_mode: PaymentMode::MonthlyConsolidated,
        }
    }

    fn bill(id: &str, user: &str, issued: u32) -> NewMemberBill {
        NewMemberBill {
            id: id.to_string(),
            promise_id: "p1".to_string(),
            user_id: user.to_string(),
            amount: 3500,
            issued_date: day(issued),
        }
    }

    #[tokio::test]
    async fn duplicate_promise_is_rejected_and_first_row_kept() {
        let store = InMemoryProjectionStore::new();
        store.insert_promise(promise("p1", "u1")).await.unwrap();

        let mut again = promise("p1", "u1");
        again.amount = 1;
        let err = store.insert_promise(again).await.unwrap_err();

        assert!(matches!(err, ProjectionError::Duplicate { entity: "payment_promise", .. }));
        assert_eq!(store.promises().len(), 1);
        assert_eq!(store.promises()[0].amount, 3500);
    }

    #[tokio::test]
    async fn paid_bill_keeps_first_paid_date() {
        let store = InMemoryProjectionStore::new();
        store.insert_bill(bill("b1", "u1", 1)).await.unwrap();

        assert_eq!(store.update_bill_paid("b1", day(5)).await.unwrap(), BillUpdate::MarkedPaid);
        assert_eq!(store.update_bill_paid("b1", day(9)).await.unwrap(), BillUpdate::Unchanged);

        let row = store.bill("b1").unwrap();
        assert_eq!(row.status, BillStatus::Paid);
        assert_eq!(row.paid_date, Some(day(5)));
    }

    #[tokio::test]
    async fn unknown_bill_is_unchanged() {
        let store = InMemoryProjectionStore::new();
        assert_eq!(
            store.update_bill_paid("missing", day(1)).await.unwrap(),
            BillUpdate::Unchanged
        );
    }

    #[tokio::test]
    async fn queries_filter_by_user_and_order_bills_by_issue_date() {
        let store = InMemoryProjectionStore::new();
        store.insert_promise(promise("p1", "u1")).await.unwrap();
        store.insert_promise(promise("p2", "u2")).await.unwrap();
        store.insert_bill(bill("late", "u1", 20)).await.unwrap();
        store.insert_bill(bill("early", "u1", 2)).await.unwrap();
        store.insert_bill(bill("other", "u2", 1)).await.unwrap();

        let promises = store.promises_for_user("u1").await.unwrap();
        assert_eq!(promises.len(), 1);
        assert_eq!(promises[0].id, "p1");

        let ids: Vec<_> = store
            .bills_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, ["early", "late"]);
    }

    #[tokio::test]
    async fn failing_store_reports_storage_error() {
        let store = InMemoryProjectionStore::new();
        store.set_failing(true);
        assert!(matches!(
            store.insert_bill(bill("b1", "u1", 1)).await,
            Err(ProjectionError::Storage(_))
        ));
    }
}
