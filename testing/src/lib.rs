//! # Paysaga Testing
//!
//! Testing utilities for the settlement saga.
//!
//! This crate provides:
//! - Deterministic environment doubles ([`FixedClock`], [`SequentialIds`])
//! - In-memory implementations of every seam trait, with switches to make
//!   them fail for error-path tests
//!
//! ## Example
//!
//! ```ignore
//! use paysaga_testing::{test_clock, InMemoryProjectionStore, InMemoryStream};
//!
//! #[tokio::test]
//! async fn purchase_creates_promise() {
//!     let stream = Arc::new(InMemoryStream::new("saga"));
//!     let projections = Arc::new(InMemoryProjectionStore::new());
//!     // wire a pipeline, push a PurchaseCompleted, run the reader ...
//!     assert_eq!(projections.promises().len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use paysaga_core::environment::{Clock, IdGenerator};

pub mod event_log;
pub mod projection_mocks;
pub mod stream;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use paysaga_testing::mocks::FixedClock;
    /// use paysaga_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2024-01-01 09:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable identifiers: `{prefix}-1`, `{prefix}-2`, ...
    #[derive(Debug)]
    pub struct SequentialIds {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIds {
        /// Start a sequence with the given prefix.
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl Default for SequentialIds {
        fn default() -> Self {
            Self::new("promise")
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::Relaxed);
            format!("{}-{n}", self.prefix)
        }
    }
}

// Re-export commonly used items
pub use event_log::InMemoryEventLog;
pub use mocks::{FixedClock, SequentialIds, test_clock};
pub use projection_mocks::InMemoryProjectionStore;
pub use stream::{InMemoryStream, RecordingNotifier, RecordingPublisher};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().date_naive().to_string(), "2024-01-01");
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::new("p");
        assert_eq!(ids.next_id(), "p-1");
        assert_eq!(ids.next_id(), "p-2");
    }
}
