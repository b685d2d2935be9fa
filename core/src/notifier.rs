//! Live-update signal for viewers of the status page.
//!
//! When a bill becomes paid the choreographer sends a single, content-free
//! refresh signal. Whoever implements [`Notifier`] fans it out to every
//! currently connected viewer; viewers re-query the projections themselves.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from delivering a refresh signal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The fan-out side has shut down.
    #[error("Notifier is closed")]
    Closed,

    /// The signal could not be handed over.
    #[error("Notify failed: {0}")]
    Transport(String),
}

/// Sink for refresh signals.
pub trait Notifier: Send + Sync {
    /// Signal every connected viewer to refresh.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the signal could not be delivered.
    fn notify_refresh(&self) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}
