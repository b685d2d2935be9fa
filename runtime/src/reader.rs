//! Tailing one partition of the saga stream.
//!
//! [`StreamReader`] owns the consume loop:
//!
//! ```text
//! partitions() ─► strategy.select() ─► latest_cursor()
//!                                           │
//!              ┌────────────────────────────┘
//!              ▼
//!          poll(cursor) ─► Pipeline::process(record)… ─► sleep ─► poll(next)
//!              │
//!              └─ no next cursor ─► Ok(ReaderExit::StreamClosed)
//! ```
//!
//! Records are processed one at a time, in partition order. Stream
//! infrastructure failures end the loop with an error; per-record failures
//! never do.

use crate::choreographer::{Choreographer, SagaEnvironment};
use crate::metrics::SagaMetrics;
use paysaga_core::event::{EventType, decode};
use paysaga_core::event_log::EventLog;
use paysaga_core::stream::{PartitionId, StreamError, StreamRecord, StreamSource};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Picks the partition a reader consumes.
///
/// The `Debug` form names the strategy in errors when nothing is selected.
pub trait PartitionStrategy: fmt::Debug + Send + Sync {
    /// Choose one of the discovered partitions, or `None` if none fits.
    fn select(&self, partitions: &[PartitionId]) -> Option<PartitionId>;
}

/// Consume the first partition the stream reports.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstPartition;

impl PartitionStrategy for FirstPartition {
    fn select(&self, partitions: &[PartitionId]) -> Option<PartitionId> {
        partitions.first().copied()
    }
}

/// Consume one specific partition, if the stream has it.
#[derive(Clone, Copy, Debug)]
pub struct FixedPartition(pub PartitionId);

impl PartitionStrategy for FixedPartition {
    fn select(&self, partitions: &[PartitionId]) -> Option<PartitionId> {
        partitions.contains(&self.0).then_some(self.0)
    }
}

/// Reader settings.
#[derive(Clone, Debug)]
pub struct ReaderConfig {
    /// Pause after every poll.
    pub poll_interval: Duration,
}

impl ReaderConfig {
    /// Default pause between polls.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Settings with the given poll interval.
    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POLL_INTERVAL)
    }
}

/// Why [`StreamReader::run`] returned successfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderExit {
    /// The stream stopped handing out cursors.
    StreamClosed,
}

/// What happened to one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The record could not be decoded and was skipped.
    Dropped {
        /// Decode failure label.
        reason: &'static str,
    },
    /// The event was choreographed.
    Processed {
        /// The decoded event type.
        event_type: EventType,
        /// Whether the event log append succeeded.
        logged: bool,
        /// How many effects failed.
        failed_effects: usize,
    },
}

/// Per-record processing: decode, log, choreograph.
#[derive(Clone)]
pub struct Pipeline {
    event_log: Arc<dyn EventLog>,
    choreographer: Choreographer,
    env: SagaEnvironment,
}

impl Pipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(event_log: Arc<dyn EventLog>, env: SagaEnvironment) -> Self {
        Self {
            event_log,
            choreographer: Choreographer,
            env,
        }
    }

    /// Process one raw record.
    ///
    /// Never fails: undecodable records are dropped, log and effect
    /// failures are logged and counted.
    #[tracing::instrument(
        skip(self, record),
        name = "process_record",
        fields(partition = %record.partition, offset = record.offset)
    )]
    pub async fn process(&self, record: &StreamRecord) -> RecordOutcome {
        let started = Instant::now();
        SagaMetrics::record_received();

        let event = match decode(&record.data) {
            Ok(event) => event,
            Err(error) => {
                let reason = error.reason();
                SagaMetrics::record_dropped(reason);
                tracing::warn!(reason, error = %error, "Dropping undecodable record");
                return RecordOutcome::Dropped { reason };
            },
        };

        let event_type = event.event_type();
        tracing::debug!(%event_type, user_id = event.user_id(), "Decoded record");

        let logged = match self.event_log.append(event_type, &record.data).await {
            Ok(id) => {
                tracing::debug!(%event_type, log_id = %id, "Event logged");
                true
            },
            Err(error) => {
                SagaMetrics::record_event_log_failure();
                tracing::warn!(%event_type, error = %error, "Failed to log event");
                false
            },
        };

        let effects = self.choreographer.react(event, &self.env);
        let failures = self.choreographer.execute(effects, &self.env).await;

        SagaMetrics::record_processed(event_type.as_str(), started.elapsed());

        RecordOutcome::Processed {
            event_type,
            logged,
            failed_effects: failures.len(),
        }
    }
}

/// Sequential consumer of one stream partition.
pub struct StreamReader {
    source: Arc<dyn StreamSource>,
    pipeline: Pipeline,
    strategy: Box<dyn PartitionStrategy>,
    config: ReaderConfig,
}

impl StreamReader {
    /// Create a reader consuming the first partition.
    #[must_use]
    pub fn new(source: Arc<dyn StreamSource>, pipeline: Pipeline, config: ReaderConfig) -> Self {
        Self {
            source,
            pipeline,
            strategy: Box::new(FirstPartition),
            config,
        }
    }

    /// Choose the partition with a different strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl PartitionStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Consume until the stream closes.
    ///
    /// Only records published after the cursor is acquired are seen.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] if partition discovery finds nothing usable, a
    /// cursor cannot be acquired, or a poll fails. None of these are retried.
    pub async fn run(self) -> Result<ReaderExit, StreamError> {
        let stream = self.source.name().to_string();

        let partitions = self.source.partitions().await?;
        if partitions.is_empty() {
            return Err(StreamError::NoPartitions(stream));
        }
        let partition = self.strategy.select(&partitions).ok_or_else(|| {
            StreamError::NoMatchingPartition {
                stream: stream.clone(),
                strategy: format!("{:?}", self.strategy),
                discovered: partitions.len(),
            }
        })?;

        let mut cursor = self.source.latest_cursor(partition).await?;
        tracing::info!(
            stream = %stream,
            partition = %partition,
            offset = cursor.offset,
            partitions = partitions.len(),
            "Stream reader started at latest position"
        );

        loop {
            let batch = self.source.poll(cursor).await?;
            if !batch.records.is_empty() {
                tracing::debug!(count = batch.records.len(), %cursor, "Polled records");
            }

            for record in &batch.records {
                self.pipeline.process(record).await;
            }

            let Some(next) = batch.next_cursor else {
                tracing::info!(stream = %stream, %cursor, "Stream closed, reader stopping");
                return Ok(ReaderExit::StreamClosed);
            };
            cursor = next;

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[i32]) -> Vec<PartitionId> {
        raw.iter().copied().map(PartitionId::new).collect()
    }

    #[test]
    fn first_partition_takes_discovery_order() {
        assert_eq!(
            FirstPartition.select(&ids(&[3, 0, 1])),
            Some(PartitionId::new(3))
        );
        assert_eq!(FirstPartition.select(&[]), None);
    }

    #[test]
    fn fixed_partition_requires_presence() {
        let strategy = FixedPartition(PartitionId::new(1));
        assert_eq!(strategy.select(&ids(&[0, 1])), Some(PartitionId::new(1)));
        assert_eq!(strategy.select(&ids(&[0, 2])), None);
    }

    #[test]
    fn default_poll_interval_is_one_second() {
        assert_eq!(ReaderConfig::default().poll_interval, Duration::from_secs(1));
    }
}
