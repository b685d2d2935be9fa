//! Redpanda transport for the paysaga saga stream.
//!
//! Implements the stream seams of `paysaga-core` on a Kafka-compatible topic
//! using rdkafka:
//!
//! - [`RedpandaPublisher`]: [`EventPublisher`](paysaga_core::stream::EventPublisher)
//!   backed by a `FutureProducer`. Every record carries the same partition
//!   key, so the whole saga lands on one partition and stays ordered.
//! - [`RedpandaPartitionReader`]: [`StreamSource`](paysaga_core::stream::StreamSource)
//!   backed by a manually assigned `StreamConsumer`. Partitions come from
//!   topic metadata, the latest position is the high watermark, and a cursor
//!   is `(partition, offset)`.
//!
//! # Delivery Semantics
//!
//! **At-least-once**. No offsets are committed: a restarted reader starts at
//! the high watermark again, so records published while it was down are not
//! replayed.
//!
//! # Example
//!
//! ```no_run
//! use paysaga_redpanda::{RedpandaPartitionReader, RedpandaPublisher};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = RedpandaPublisher::builder()
//!     .brokers("localhost:9092")
//!     .topic("paysaga-events")
//!     .partition_key("partition-key-1")
//!     .build()?;
//!
//! let reader = RedpandaPartitionReader::builder()
//!     .brokers("localhost:9092")
//!     .topic("paysaga-events")
//!     .max_records(100)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

mod publisher;
mod reader;

pub use publisher::{RedpandaPublisher, RedpandaPublisherBuilder};
pub use reader::{RedpandaPartitionReader, RedpandaPartitionReaderBuilder};

/// Default topic carrying the saga.
pub const DEFAULT_TOPIC: &str = "paysaga-events";

/// Default partition key for published records.
pub const DEFAULT_PARTITION_KEY: &str = "partition-key-1";

/// Errors from building a Redpanda client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// No broker addresses were given.
    #[error("Brokers not configured")]
    MissingBrokers,

    /// rdkafka rejected the client configuration.
    #[error("Failed to create {client}: {reason}")]
    Create {
        /// Which client (`producer` or `consumer`).
        client: &'static str,
        /// The reason for failure.
        reason: String,
    },
}
