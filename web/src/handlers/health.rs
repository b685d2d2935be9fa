//! Liveness endpoint for load balancers and container orchestration.

use axum::http::StatusCode;

/// `GET /health`: returns 200 `ok` while the process serves requests.
///
/// Does not check the database or the stream.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
