//! Application state for Axum handlers.

use crate::hub::HubHandle;
use paysaga_core::environment::{Clock, IdGenerator};
use paysaga_core::projection::ProjectionStore;
use paysaga_core::stream::EventPublisher;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Intake handlers only publish; they never touch the projections. The
/// status route only reads them.
#[derive(Clone)]
pub struct AppState {
    /// Outbound side of the saga stream.
    pub publisher: Arc<dyn EventPublisher>,
    /// Read models queried by the status route.
    pub projections: Arc<dyn ProjectionStore>,
    /// Source of "today" for issue and payment dates.
    pub clock: Arc<dyn Clock>,
    /// Mints bill identifiers.
    pub ids: Arc<dyn IdGenerator>,
    /// Live-update hub for `/ws` viewers.
    pub hub: HubHandle,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        projections: Arc<dyn ProjectionStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        hub: HubHandle,
    ) -> Self {
        Self {
            publisher,
            projections,
            clock,
            ids,
            hub,
        }
    }
}
