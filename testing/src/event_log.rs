//! In-memory event log.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use chrono::Utc;
use paysaga_core::event::EventType;
use paysaga_core::event_log::{EventLog, EventLogEntry, EventLogError, EventLogId};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Vec-backed [`EventLog`].
///
/// # Example
///
/// ```
/// use paysaga_testing::InMemoryEventLog;
/// use paysaga_core::event::EventType;
/// use paysaga_core::event_log::EventLog;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let log = InMemoryEventLog::new();
/// log.append(EventType::PurchaseCompleted, br#"{"event_type":"PurchaseCompleted"}"#).await?;
/// assert_eq!(log.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventLog {
    entries: Arc<RwLock<Vec<EventLogEntry>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryEventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following append fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of all entries in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<EventLogEntry> {
        self.entries.read().unwrap().clone()
    }

    /// Discriminators of all entries in append order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl EventLog for InMemoryEventLog {
    fn append(
        &self,
        event_type: EventType,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<EventLogId, EventLogError>> + Send + '_>> {
        let payload = payload.to_vec();
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(EventLogError::Database("event log unavailable".to_string()));
            }
            let id = EventLogId::generate();
            self.entries.write().unwrap().push(EventLogEntry {
                id,
                event_type: event_type.as_str().to_string(),
                payload,
                recorded_at: Utc::now(),
            });
            Ok(id)
        })
    }
}
