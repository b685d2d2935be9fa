//! Command intake: turns HTTP requests into the events that start or advance
//! a saga.
//!
//! | Route | Emits |
//! |---|---|
//! | `POST /purchase` | `PurchaseCompleted` |
//! | `POST /create-bill/immediate` | `MemberBillCreated` |
//! | `POST /webhook/payment-completed` | `PaymentCompleted` |
//!
//! Handlers only publish. Projections change once the consumer reads the
//! event back from the stream.

use crate::error::AppError;
use crate::extractors::JsonBody;
use crate::state::AppState;
use axum::{Json, extract::State};
use paysaga_core::event::{MemberBillCreated, PaymentCompleted, PurchaseCompleted, SagaEvent};
use serde::{Deserialize, Serialize};

/// `POST /purchase` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseCommand {
    /// Purchasing member.
    pub user_id: String,
    /// Product identifier, informational.
    pub product_id: String,
    /// Product name, informational.
    pub product_name: String,
    /// Purchase total in minor currency units.
    pub amount: i64,
}

/// `POST /create-bill/immediate` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBillCommand {
    /// Promise the bill collects.
    pub promise_id: String,
    /// Billed member.
    pub user_id: String,
    /// Billed amount.
    pub amount: i64,
}

/// `POST /webhook/payment-completed` body, as sent by the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedWebhook {
    /// The bill that was paid.
    pub bill_id: String,
    /// Paying member.
    pub user_id: String,
    /// Paid amount.
    pub amount: i64,
}

/// Success body of every intake route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted {
    /// What was emitted.
    pub message: String,
}

impl Accepted {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

async fn emit(state: &AppState, event: SagaEvent) -> Result<(), AppError> {
    state.publisher.publish(&event).await?;

    tracing::info!(
        event_type = %event.event_type(),
        user_id = %event.user_id(),
        "Event emitted"
    );
    Ok(())
}

/// Record a completed purchase.
///
/// The order id is derived from the member: `order-{user_id}`.
///
/// # Errors
///
/// Returns a 500 [`AppError`] if the event cannot be published.
pub async fn purchase(
    State(state): State<AppState>,
    JsonBody(command): JsonBody<PurchaseCommand>,
) -> Result<Json<Accepted>, AppError> {
    tracing::debug!(
        user_id = %command.user_id,
        product_id = %command.product_id,
        product_name = %command.product_name,
        "Purchase command received"
    );

    let event = PurchaseCompleted {
        order_id: format!("order-{}", command.user_id),
        user_id: command.user_id,
        amount: command.amount,
    };
    emit(&state, event.into()).await?;

    Ok(Accepted::new("Purchase command processed and event emitted"))
}

/// Issue a bill for immediate payment, dated today.
///
/// # Errors
///
/// Returns a 500 [`AppError`] if the event cannot be published.
pub async fn create_bill_immediate(
    State(state): State<AppState>,
    JsonBody(command): JsonBody<CreateBillCommand>,
) -> Result<Json<Accepted>, AppError> {
    let event = MemberBillCreated {
        bill_id: state.ids.next_id(),
        promise_id: command.promise_id,
        user_id: command.user_id,
        amount: command.amount,
        issued_date: state.clock.now().date_naive(),
    };
    emit(&state, event.into()).await?;

    Ok(Accepted::new("Member bill created event emitted for immediate payment"))
}

/// Record a payment reported by the provider, dated today.
///
/// # Errors
///
/// Returns a 500 [`AppError`] if the event cannot be published.
pub async fn payment_completed(
    State(state): State<AppState>,
    JsonBody(webhook): JsonBody<PaymentCompletedWebhook>,
) -> Result<Json<Accepted>, AppError> {
    let event = PaymentCompleted {
        bill_id: webhook.bill_id,
        user_id: webhook.user_id,
        amount: webhook.amount,
        paid_date: state.clock.now().date_naive(),
    };
    emit(&state, event.into()).await?;

    Ok(Accepted::new("Payment completed event emitted"))
}
