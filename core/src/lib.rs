//! # Paysaga Core
//!
//! Event model, wire codec and seam traits for the deferred-payment settlement saga.
//!
//! A purchase triggers a payment promise, the promise produces a member bill,
//! and the bill is eventually marked paid. Each step is an event on a
//! partitioned stream; a choreographer reacts to each event, maintains read
//! models, and emits the next event.
//!
//! ## Core Concepts
//!
//! - **[`SagaEvent`](event::SagaEvent)**: closed set of saga events, decoded from a flat JSON envelope
//! - **[`EventLog`](event_log::EventLog)**: append-only audit trail of every decoded record
//! - **[`ProjectionStore`](projection::ProjectionStore)**: read models of promises and bills
//! - **[`StreamSource`](stream::StreamSource)** / **[`EventPublisher`](stream::EventPublisher)**: the stream, read and write side
//! - **[`Notifier`](notifier::Notifier)**: content-free refresh signal for live viewers
//! - **Environment**: time and identifiers injected via traits
//!
//! Concrete implementations live in sibling crates (`paysaga-postgres`,
//! `paysaga-projections`, `paysaga-redpanda`, `paysaga-web`) and in-memory
//! doubles in `paysaga-testing`.

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};

pub mod event;
pub mod event_log;
pub mod notifier;
pub mod projection;
pub mod stream;

/// Environment module - Dependency injection traits
///
/// Everything the choreographer needs from the outside world that is not a
/// store or a stream: the current time and fresh identifiers. Both are traits
/// so tests can pin them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use paysaga_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of fresh, unique identifiers.
    pub trait IdGenerator: Send + Sync {
        /// Produce an identifier never returned before.
        fn next_id(&self) -> String;
    }

    /// Random UUID v4 identifiers.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidIds;

    impl IdGenerator for UuidIds {
        fn next_id(&self) -> String {
            uuid::Uuid::new_v4().to_string()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn uuid_ids_are_unique() {
            let ids = UuidIds;
            assert_ne!(ids.next_id(), ids.next_id());
        }
    }
}
