//! Saga choreography: functional core, imperative shell.
//!
//! [`Choreographer::react`] is a pure function from one decoded event to the
//! [`Effect`]s it causes. [`Choreographer::execute`] carries those effects
//! out against the projection store, the publisher and the notifier held by
//! the [`SagaEnvironment`].
//!
//! | Event | Effects |
//! |---|---|
//! | `PurchaseCompleted` | publish `PaymentPromiseCreated` |
//! | `PaymentPromiseCreated` | insert promise row |
//! | `MemberBillCreated` | insert unpaid bill row |
//! | `PaymentCompleted` | mark bill paid, then notify viewers |
//!
//! Effects are independent. A failing effect is logged and the remaining
//! ones still run.

use crate::metrics::SagaMetrics;
use chrono::{Days, NaiveDate};
use paysaga_core::environment::{Clock, IdGenerator};
use paysaga_core::event::{PaymentMode, PaymentPromiseCreated, SagaEvent};
use paysaga_core::notifier::{Notifier, NotifyError};
use paysaga_core::projection::{
    BillUpdate, NewMemberBill, NewPaymentPromise, ProjectionError, ProjectionStore,
};
use paysaga_core::stream::{EventPublisher, PublishError};
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use thiserror::Error;

/// Days between the purchase and the promise's due date.
pub const PROMISE_TERM_DAYS: u64 = 30;

/// The billing mode every promise created by the saga gets.
pub const PROMISE_PAYMENT_MODE: PaymentMode = PaymentMode::MonthlyConsolidated;

/// One side effect decided by [`Choreographer::react`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Push a derived event onto the stream.
    Publish(SagaEvent),
    /// Insert a promise row.
    InsertPromise(NewPaymentPromise),
    /// Insert an unpaid bill row.
    InsertBill(NewMemberBill),
    /// Mark an unpaid bill as paid.
    MarkBillPaid {
        /// Bill to settle.
        bill_id: String,
        /// Payment date.
        paid_date: NaiveDate,
    },
    /// Tell live viewers to refresh.
    Notify,
}

impl Effect {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Publish(_) => "publish",
            Self::InsertPromise(_) => "insert_promise",
            Self::InsertBill(_) => "insert_bill",
            Self::MarkBillPaid { .. } => "update_bill_paid",
            Self::Notify => "notify",
        }
    }
}

/// Effects of one event. No event causes more than two.
pub type Effects = SmallVec<[Effect; 2]>;

/// A failed effect, as reported by [`Choreographer::execute`].
#[derive(Error, Debug)]
pub enum EffectError {
    /// A projection write failed.
    #[error("{operation} failed: {source}")]
    Projection {
        /// The projection operation.
        operation: &'static str,
        /// The store error.
        #[source]
        source: ProjectionError,
    },

    /// A derived event could not be published.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Viewers could not be signaled.
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Everything the choreographer touches outside itself.
#[derive(Clone)]
pub struct SagaEnvironment {
    /// Source of "today" for due dates.
    pub clock: Arc<dyn Clock>,
    /// Source of promise identifiers.
    pub ids: Arc<dyn IdGenerator>,
    /// Read models.
    pub projections: Arc<dyn ProjectionStore>,
    /// Outbound side of the stream.
    pub publisher: Arc<dyn EventPublisher>,
    /// Live-update fan-out.
    pub notifier: Arc<dyn Notifier>,
}

impl SagaEnvironment {
    /// Bundle the dependencies.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        projections: Arc<dyn ProjectionStore>,
        publisher: Arc<dyn EventPublisher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock,
            ids,
            projections,
            publisher,
            notifier,
        }
    }
}

/// Saga rules of the settlement workflow.
#[derive(Clone, Copy, Debug, Default)]
pub struct Choreographer;

impl Choreographer {
    /// Decide the effects of one event.
    ///
    /// Only reads the clock and draws an id; never touches a store.
    #[must_use]
    pub fn react(&self, event: SagaEvent, env: &SagaEnvironment) -> Effects {
        match event {
            SagaEvent::PurchaseCompleted(purchase) => {
                let today = env.clock.now().date_naive();
                let due_date = today
                    .checked_add_days(Days::new(PROMISE_TERM_DAYS))
                    .unwrap_or(NaiveDate::MAX);

                smallvec![Effect::Publish(SagaEvent::from(PaymentPromiseCreated {
                    promise_id: env.ids.next_id(),
                    order_id: purchase.order_id,
                    user_id: purchase.user_id,
                    amount: purchase.amount,
                    due_date,
                    payment_mode: PROMISE_PAYMENT_MODE,
                }))]
            },
            SagaEvent::PaymentPromiseCreated(promise) => {
                smallvec![Effect::InsertPromise(promise.into())]
            },
            SagaEvent::MemberBillCreated(bill) => smallvec![Effect::InsertBill(bill.into())],
            SagaEvent::PaymentCompleted(payment) => smallvec![
                Effect::MarkBillPaid {
                    bill_id: payment.bill_id,
                    paid_date: payment.paid_date,
                },
                Effect::Notify,
            ],
        }
    }

    /// Run effects in order. Failures are logged and returned; they never
    /// stop the remaining effects.
    pub async fn execute(&self, effects: Effects, env: &SagaEnvironment) -> Vec<EffectError> {
        let mut failures = Vec::new();

        for effect in effects {
            let operation = effect.operation();
            if let Err(error) = Self::run_effect(effect, env).await {
                match &error {
                    EffectError::Projection {
                        source: ProjectionError::Duplicate { entity, id },
                        ..
                    } => {
                        tracing::info!(%entity, %id, "Row already projected, skipping");
                    },
                    EffectError::Projection { .. } => {
                        SagaMetrics::record_projection_failure(operation);
                        tracing::error!(operation, error = %error, "Projection write failed");
                    },
                    EffectError::Publish(_) => {
                        SagaMetrics::record_publish_failure();
                        tracing::error!(error = %error, "Failed to publish derived event");
                    },
                    EffectError::Notify(_) => {
                        tracing::warn!(error = %error, "Failed to notify viewers");
                    },
                }
                failures.push(error);
            }
        }

        failures
    }

    async fn run_effect(effect: Effect, env: &SagaEnvironment) -> Result<(), EffectError> {
        match effect {
            Effect::Publish(event) => {
                env.publisher.publish(&event).await?;
                tracing::info!(
                    event_type = %event.event_type(),
                    user_id = event.user_id(),
                    "Published derived event"
                );
            },
            Effect::InsertPromise(promise) => {
                let promise_id = promise.id.clone();
                env.projections
                    .insert_promise(promise)
                    .await
                    .map_err(projection("insert_promise"))?;
                tracing::info!(promise_id = %promise_id, "Payment promise projected");
            },
            Effect::InsertBill(bill) => {
                let bill_id = bill.id.clone();
                env.projections
                    .insert_bill(bill)
                    .await
                    .map_err(projection("insert_bill"))?;
                tracing::info!(bill_id = %bill_id, "Member bill projected");
            },
            Effect::MarkBillPaid { bill_id, paid_date } => {
                let update = env
                    .projections
                    .update_bill_paid(&bill_id, paid_date)
                    .await
                    .map_err(projection("update_bill_paid"))?;
                match update {
                    BillUpdate::MarkedPaid => {
                        tracing::info!(bill_id = %bill_id, %paid_date, "Bill marked paid");
                    },
                    BillUpdate::Unchanged => {
                        tracing::info!(bill_id = %bill_id, "No unpaid bill to settle");
                    },
                }
            },
            Effect::Notify => {
                env.notifier.notify_refresh().await?;
                tracing::debug!("Viewers notified");
            },
        }

        Ok(())
    }
}

fn projection(operation: &'static str) -> impl FnOnce(ProjectionError) -> EffectError {
    move |source| EffectError::Projection { operation, source }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use paysaga_core::event::{MemberBillCreated, PaymentCompleted, PurchaseCompleted};
    use paysaga_core::projection::BillStatus;
    use paysaga_testing::{
        InMemoryProjectionStore, RecordingNotifier, RecordingPublisher, SequentialIds, test_clock,
    };

    struct Fixture {
        env: SagaEnvironment,
        projections: InMemoryProjectionStore,
        publisher: RecordingPublisher,
        notifier: RecordingNotifier,
    }

    fn fixture() -> Fixture {
        let projections = InMemoryProjectionStore::new();
        let publisher = RecordingPublisher::new();
        let notifier = RecordingNotifier::new();
        let env = SagaEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(SequentialIds::new("promise")),
            Arc::new(projections.clone()),
            Arc::new(publisher.clone()),
            Arc::new(notifier.clone()),
        );
        Fixture {
            env,
            projections,
            publisher,
            notifier,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bill_created() -> SagaEvent {
        SagaEvent::from(MemberBillCreated {
            bill_id: "b1".to_string(),
            promise_id: "promise-1".to_string(),
            user_id: "u1".to_string(),
            amount: 3500,
            issued_date: date(2024, 1, 15),
        })
    }

    fn payment_completed(paid: NaiveDate) -> SagaEvent {
        SagaEvent::from(PaymentCompleted {
            bill_id: "b1".to_string(),
            user_id: "u1".to_string(),
            amount: 3500,
            paid_date: paid,
        })
    }

    #[test]
    fn purchase_derives_one_promise_due_in_thirty_days() {
        let f = fixture();
        let purchase = SagaEvent::from(PurchaseCompleted {
            order_id: "o1".to_string(),
            user_id: "u1".to_string(),
            amount: 3500,
        });

        let effects = Choreographer.react(purchase, &f.env);

        assert_eq!(
            effects.as_slice(),
            [Effect::Publish(SagaEvent::from(PaymentPromiseCreated {
                promise_id: "promise-1".to_string(),
                order_id: "o1".to_string(),
                user_id: "u1".to_string(),
                amount: 3500,
                due_date: date(2024, 1, 31),
                payment_mode: PaymentMode::MonthlyConsolidated,
            }))]
        );
    }

    #[test]
    fn each_purchase_gets_a_fresh_promise_id() {
        let f = fixture();
        let purchase = SagaEvent::from(PurchaseCompleted {
            order_id: "o1".to_string(),
            user_id: "u1".to_string(),
            amount: 1,
        });

        let first = Choreographer.react(purchase.clone(), &f.env);
        let second = Choreographer.react(purchase, &f.env);

        assert_ne!(first, second);
    }

    #[test]
    fn payment_marks_bill_then_notifies() {
        let f = fixture();
        let effects = Choreographer.react(payment_completed(date(2024, 2, 1)), &f.env);

        assert_eq!(
            effects.as_slice(),
            [
                Effect::MarkBillPaid {
                    bill_id: "b1".to_string(),
                    paid_date: date(2024, 2, 1),
                },
                Effect::Notify,
            ]
        );
    }

    #[tokio::test]
    async fn bill_is_inserted_unpaid() {
        let f = fixture();
        let effects = Choreographer.react(bill_created(), &f.env);

        let failures = Choreographer.execute(effects, &f.env).await;

        assert!(failures.is_empty());
        let bill = f.projections.bill("b1").unwrap();
        assert_eq!(bill.status, BillStatus::Unpaid);
        assert_eq!(bill.paid_date, None);
        assert!(f.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn repeated_payment_keeps_first_paid_date_and_still_notifies() {
        let f = fixture();
        let insert = Choreographer.react(bill_created(), &f.env);
        Choreographer.execute(insert, &f.env).await;

        for paid in [date(2024, 2, 1), date(2024, 2, 9)] {
            let effects = Choreographer.react(payment_completed(paid), &f.env);
            assert!(Choreographer.execute(effects, &f.env).await.is_empty());
        }

        let bill = f.projections.bill("b1").unwrap();
        assert_eq!(bill.status, BillStatus::Paid);
        assert_eq!(bill.paid_date, Some(date(2024, 2, 1)));
        assert_eq!(f.notifier.count(), 2);
    }

    #[tokio::test]
    async fn duplicate_insert_is_reported_but_not_fatal() {
        let f = fixture();
        for _ in 0..2 {
            let effects = Choreographer.react(bill_created(), &f.env);
            Choreographer.execute(effects, &f.env).await;
        }

        let effects = Choreographer.react(bill_created(), &f.env);
        let failures = Choreographer.execute(effects, &f.env).await;

        assert!(matches!(
            failures.as_slice(),
            [EffectError::Projection {
                source: ProjectionError::Duplicate { .. },
                ..
            }]
        ));
        assert_eq!(f.projections.bills().len(), 1);
    }

    #[tokio::test]
    async fn notify_runs_even_when_the_update_fails() {
        let f = fixture();
        f.projections.set_failing(true);

        let effects = Choreographer.react(payment_completed(date(2024, 2, 1)), &f.env);
        let failures = Choreographer.execute(effects, &f.env).await;

        assert_eq!(failures.len(), 1);
        assert_eq!(f.notifier.count(), 1);
    }

    #[tokio::test]
    async fn publish_failure_is_returned() {
        let f = fixture();
        f.publisher.set_failing(true);
        let purchase = SagaEvent::from(PurchaseCompleted {
            order_id: "o1".to_string(),
            user_id: "u1".to_string(),
            amount: 3500,
        });

        let effects = Choreographer.react(purchase, &f.env);
        let failures = Choreographer.execute(effects, &f.env).await;

        assert!(matches!(failures.as_slice(), [EffectError::Publish(_)]));
    }
}
