//! Append-only audit log of every decoded stream record.
//!
//! The event log keeps the raw payload of each record next to its
//! discriminator. It exists for audit and debugging; projections never read
//! from it, so a failed append is logged by the caller and processing goes on.
//!
//! # Implementations
//!
//! - `PostgresEventLog` (in `paysaga-postgres`): the `events` table
//! - `InMemoryEventLog` (in `paysaga-testing`): for tests

use crate::event::EventType;
use crate::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Errors from event log operations.
#[derive(Error, Debug)]
pub enum EventLogError {
    /// The backing database rejected the write or could not be reached.
    #[error("Database error: {0}")]
    Database(String),
}

/// Identifier of a log entry, generated on append.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventLogId(Uuid);

impl EventLogId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID (e.g. one read back from storage).
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EventLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted log entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Generated identifier.
    pub id: EventLogId,
    /// Discriminator of the logged record.
    pub event_type: String,
    /// The record payload, byte for byte as it was read from the stream.
    pub payload: Vec<u8>,
    /// When the entry was written.
    pub recorded_at: DateTime<Utc>,
}

/// Durable, append-only store of decoded records.
///
/// Entries are never updated or deleted.
///
/// # Dyn Compatibility
///
/// Returns `Pin<Box<dyn Future>>` so the log can be shared as `Arc<dyn EventLog>`.
pub trait EventLog: Send + Sync {
    /// Append one record and return the identifier generated for it.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] if the entry could not be written.
    fn append(
        &self,
        event_type: EventType,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<EventLogId, EventLogError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_differ() {
        assert_ne!(EventLogId::generate(), EventLogId::generate());
    }

    #[test]
    fn id_displays_as_uuid() {
        let uuid = Uuid::new_v4();
        assert_eq!(EventLogId::from_uuid(uuid).to_string(), uuid.to_string());
    }
}
