//! Member status: the promise and bill read models of one user.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use paysaga_core::projection::{MemberBill, PaymentPromise};
use serde::{Deserialize, Serialize};

/// Body of `GET /user/:user_id/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    /// The member queried.
    pub user_id: String,
    /// Purchase history, oldest first.
    pub promises: Vec<PaymentPromise>,
    /// Billing status, by issue date.
    pub bills: Vec<MemberBill>,
}

/// Load the promises and bills of a member.
///
/// An unknown member is not an error; both lists are empty.
///
/// # Errors
///
/// Returns a 500 [`AppError`] if either projection query fails.
pub async fn user_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStatus>, AppError> {
    let promises = state.projections.promises_for_user(&user_id).await?;
    let bills = state.projections.bills_for_user(&user_id).await?;

    tracing::debug!(
        user_id = %user_id,
        promises = promises.len(),
        bills = bills.len(),
        "Status loaded"
    );

    Ok(Json(UserStatus {
        user_id,
        promises,
        bills,
    }))
}
