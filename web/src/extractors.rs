//! Request extractors.

use crate::error::AppError;
use axum::extract::FromRequest;

/// JSON request body whose rejections are reported as [`AppError`].
///
/// Behaves like [`axum::Json`]: a missing content type is 415, unparsable
/// JSON is 400 and a body with missing or mistyped fields is 422. The only
/// difference is the JSON error body.
///
/// # Example
///
/// ```ignore
/// async fn purchase(JsonBody(command): JsonBody<PurchaseCommand>) -> impl IntoResponse {
///     // ...
/// }
/// ```
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);
