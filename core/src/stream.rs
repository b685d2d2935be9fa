//! The partitioned event stream: reading side and publishing side.
//!
//! # Reading
//!
//! A [`StreamSource`] exposes the primitives a tailing consumer needs:
//!
//! 1. [`partitions`](StreamSource::partitions) discovers the partition set
//! 2. [`latest_cursor`](StreamSource::latest_cursor) positions a cursor after the
//!    newest record of a partition (records published earlier are never seen)
//! 3. [`poll`](StreamSource::poll) returns the next batch and the cursor to
//!    resume from, or no cursor once the stream is closed
//!
//! # Publishing
//!
//! An [`EventPublisher`] pushes one [`SagaEvent`] onto the stream. The
//! choreographer and the command intake API both use it; they are peers
//! writing to the same stream.
//!
//! # Delivery Semantics
//!
//! **At-least-once**: a record may be delivered more than once. Ordering is
//! guaranteed within a partition only.
//!
//! # Implementations
//!
//! - `RedpandaPartitionReader` / `RedpandaPublisher` (in `paysaga-redpanda`)
//! - `InMemoryStream` (in `paysaga-testing`)

use crate::event::{EncodeError, EventType, SagaEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Identifier of one partition (shard) of the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(i32);

impl PartitionId {
    /// Wrap a raw partition number.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// The raw partition number.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position in a partition where the next poll resumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    /// Partition being read.
    pub partition: PartitionId,
    /// Offset of the next record to deliver.
    pub offset: i64,
}

impl Cursor {
    /// Create a cursor.
    #[must_use]
    pub const fn new(partition: PartitionId, offset: i64) -> Self {
        Self { partition, offset }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.partition, self.offset)
    }
}

/// One raw record read from a partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRecord {
    /// Partition the record came from.
    pub partition: PartitionId,
    /// Offset within the partition.
    pub offset: i64,
    /// The raw payload (a JSON envelope, not yet decoded).
    pub data: Vec<u8>,
}

/// Result of one poll.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    /// Records in arrival order; may be empty.
    pub records: Vec<StreamRecord>,
    /// Where to resume, or `None` once the stream is closed.
    pub next_cursor: Option<Cursor>,
}

/// Errors from the stream infrastructure. All of them are fatal for a reader.
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    /// The stream exists but has no partitions.
    #[error("No partitions found for stream '{0}'")]
    NoPartitions(String),

    /// Partitions exist but the selection strategy accepted none of them.
    #[error("No partition of stream '{stream}' matches {strategy} ({discovered} discovered)")]
    NoMatchingPartition {
        /// The stream being described.
        stream: String,
        /// The strategy that was asked to choose.
        strategy: String,
        /// How many partitions were discovered.
        discovered: usize,
    },

    /// Partition discovery failed.
    #[error("Partition discovery failed for stream '{stream}': {reason}")]
    Discovery {
        /// The stream being described.
        stream: String,
        /// The reason for failure.
        reason: String,
    },

    /// A cursor could not be acquired.
    #[error("Failed to acquire cursor for partition {partition}: {reason}")]
    Cursor {
        /// The partition.
        partition: PartitionId,
        /// The reason for failure.
        reason: String,
    },

    /// Fetching records failed.
    #[error("Poll failed at {cursor}: {reason}")]
    Poll {
        /// The cursor being polled.
        cursor: Cursor,
        /// The reason for failure.
        reason: String,
    },
}

/// Errors from publishing an event.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The event could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The stream rejected or did not acknowledge the record.
    #[error("Publish of {event_type} failed: {reason}")]
    Transport {
        /// The event that failed.
        event_type: EventType,
        /// The reason for failure.
        reason: String,
    },
}

/// Reading side of the stream.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns so readers can hold
/// an `Arc<dyn StreamSource>`.
pub trait StreamSource: Send + Sync {
    /// Name of the stream, for logs.
    fn name(&self) -> &str;

    /// Discover the partitions of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Discovery`] if the stream cannot be described.
    fn partitions(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PartitionId>, StreamError>> + Send + '_>>;

    /// Acquire a cursor positioned after the newest record of `partition`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Cursor`] if the position cannot be resolved.
    fn latest_cursor(
        &self,
        partition: PartitionId,
    ) -> Pin<Box<dyn Future<Output = Result<Cursor, StreamError>> + Send + '_>>;

    /// Fetch the records available at `cursor`.
    ///
    /// Returns an empty batch when nothing new arrived, and a batch without a
    /// next cursor when the stream has been closed.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Poll`] if the fetch fails.
    fn poll(
        &self,
        cursor: Cursor,
    ) -> Pin<Box<dyn Future<Output = Result<Batch, StreamError>> + Send + '_>>;
}

/// Publishing side of the stream.
///
/// # Dyn Compatibility
///
/// Uses `Pin<Box<dyn Future>>` so it can be shared as `Arc<dyn EventPublisher>`.
pub trait EventPublisher: Send + Sync {
    /// Push an event onto the stream.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if encoding or delivery fails.
    fn publish(
        &self,
        event: &SagaEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_display_names_partition_and_offset() {
        let cursor = Cursor::new(PartitionId::new(0), 42);
        assert_eq!(cursor.to_string(), "0@42");
    }

    #[test]
    fn poll_error_display() {
        let error = StreamError::Poll {
            cursor: Cursor::new(PartitionId::new(1), 7),
            reason: "broker down".to_string(),
        };
        let display = format!("{error}");
        assert!(display.contains("1@7"));
        assert!(display.contains("broker down"));
    }

    #[test]
    fn partitions_order_by_number() {
        let mut ids = vec![PartitionId::new(2), PartitionId::new(0), PartitionId::new(1)];
        ids.sort();
        assert_eq!(ids.first().map(|p| p.get()), Some(0));
    }
}
