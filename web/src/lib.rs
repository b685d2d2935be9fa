//! HTTP surface of the paysaga settlement saga.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  intake (POST)               │ ──publish──> saga stream
//! ├──────────────────────────────┤
//! │  status (GET)                │ <──query─── projections
//! ├──────────────────────────────┤
//! │  /ws                         │ <──signal── ViewerHub <── choreographer
//! └──────────────────────────────┘
//! ```
//!
//! The web side never writes projections. Commands become events on the
//! stream and come back through the consumer like every other record.
//!
//! # Example
//!
//! ```ignore
//! use paysaga_web::{AppState, ViewerHub, router};
//!
//! let (hub, _hub_task) = ViewerHub::spawn(64);
//! let state = AppState::new(publisher, projections, clock, ids, hub);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router(state)).await?;
//! ```

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod hub;
pub mod intake;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::JsonBody;
pub use hub::{HubHandle, UPDATE_FRAME, Viewer, ViewerHub};
pub use state::AppState;

/// Build the complete router: intake, status, `/ws` and `/health`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Command intake
        .route("/purchase", post(intake::purchase))
        .route("/create-bill/immediate", post(intake::create_bill_immediate))
        .route("/webhook/payment-completed", post(intake::payment_completed))
        // Read side
        .route("/user/:user_id/status", get(handlers::user_status))
        .route("/ws", get(handlers::websocket::handle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
