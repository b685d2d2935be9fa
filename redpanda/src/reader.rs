use crate::{ClientError, DEFAULT_TOPIC};
use paysaga_core::stream::{
    Batch, Cursor, PartitionId, StreamError, StreamRecord, StreamSource,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Wait for further records once the first of a batch has arrived.
const DRAIN_WAIT: Duration = Duration::from_millis(10);

/// Reads one partition of a Redpanda topic by explicit offset.
///
/// The consumer is assigned, never subscribed: there is no consumer group
/// rebalancing and nothing is committed. The reader remembers where the
/// consumer is positioned and only re-assigns when asked to poll elsewhere.
///
/// Metadata and watermark lookups are blocking librdkafka calls and run on
/// the blocking thread pool.
pub struct RedpandaPartitionReader {
    consumer: Arc<StreamConsumer>,
    topic: String,
    max_records: usize,
    poll_wait: Duration,
    metadata_timeout: Duration,
    position: Mutex<Option<Cursor>>,
}

impl RedpandaPartitionReader {
    /// Create a new builder for configuring the reader.
    #[must_use]
    pub fn builder() -> RedpandaPartitionReaderBuilder {
        RedpandaPartitionReaderBuilder::default()
    }

    /// Topic being read.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Upper bound of records returned by one poll.
    #[must_use]
    pub const fn max_records(&self) -> usize {
        self.max_records
    }

    fn assign(&self, cursor: Cursor) -> Result<(), StreamError> {
        let poll_error = |reason: String| StreamError::Poll { cursor, reason };

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(&self.topic, cursor.partition.get(), Offset::Offset(cursor.offset))
            .map_err(|e| poll_error(e.to_string()))?;
        self.consumer
            .assign(&assignment)
            .map_err(|e| poll_error(format!("Failed to assign partition: {e}")))?;

        tracing::debug!(topic = %self.topic, %cursor, "Consumer assigned");
        Ok(())
    }

    fn positioned_at(&self) -> Option<Cursor> {
        self.position.lock().ok().and_then(|guard| *guard)
    }

    fn set_position(&self, cursor: Option<Cursor>) {
        if let Ok(mut guard) = self.position.lock() {
            *guard = cursor;
        }
    }
}

/// Builder for configuring a [`RedpandaPartitionReader`].
#[derive(Default)]
pub struct RedpandaPartitionReaderBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    group_id: Option<String>,
    max_records: Option<usize>,
    poll_wait: Option<Duration>,
    metadata_timeout: Option<Duration>,
}

impl RedpandaPartitionReaderBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the topic. Default: `paysaga-events`.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the client group id. Nothing is committed under it.
    ///
    /// Default: `paysaga-reader`
    #[must_use]
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Cap the records returned by one poll. Default: 100. Zero counts as one.
    #[must_use]
    pub fn max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records.max(1));
        self
    }

    /// How long a poll waits for the first record. Default: 500ms.
    #[must_use]
    pub const fn poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = Some(wait);
        self
    }

    /// Timeout for metadata and watermark lookups. Default: 5 seconds.
    #[must_use]
    pub const fn metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = Some(timeout);
        self
    }

    /// Build the [`RedpandaPartitionReader`].
    ///
    /// # Errors
    ///
    /// - [`ClientError::MissingBrokers`] if no brokers were set
    /// - [`ClientError::Create`] if rdkafka rejects the configuration
    pub fn build(self) -> Result<RedpandaPartitionReader, ClientError> {
        let brokers = self.brokers.ok_or(ClientError::MissingBrokers)?;
        let group_id = self.group_id.unwrap_or_else(|| "paysaga-reader".to_string());

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| ClientError::Create {
                client: "consumer",
                reason: e.to_string(),
            })?;

        let reader = RedpandaPartitionReader {
            consumer: Arc::new(consumer),
            topic: self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            max_records: self.max_records.unwrap_or(100),
            poll_wait: self.poll_wait.unwrap_or(Duration::from_millis(500)),
            metadata_timeout: self.metadata_timeout.unwrap_or(Duration::from_secs(5)),
            position: Mutex::new(None),
        };

        tracing::info!(
            brokers = %brokers,
            topic = %reader.topic,
            max_records = reader.max_records,
            "RedpandaPartitionReader created"
        );

        Ok(reader)
    }
}

fn is_gone(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownPartition)
    )
}

impl StreamSource for RedpandaPartitionReader {
    fn name(&self) -> &str {
        &self.topic
    }

    fn partitions(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PartitionId>, StreamError>> + Send + '_>> {
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topic.clone();
        let timeout = self.metadata_timeout;

        Box::pin(async move {
            let discovery_error = |reason: String| StreamError::Discovery {
                stream: topic.clone(),
                reason,
            };

            let lookup_topic = topic.clone();
            let partitions = tokio::task::spawn_blocking(move || -> Result<Vec<PartitionId>, String> {
                let metadata = consumer
                    .fetch_metadata(Some(&lookup_topic), timeout)
                    .map_err(|e| e.to_string())?;
                let Some(described) = metadata.topics().iter().find(|t| t.name() == lookup_topic)
                else {
                    return Ok(Vec::new());
                };
                if let Some(code) = described.error() {
                    return Err(format!("{code:?}"));
                }
                Ok(described
                    .partitions()
                    .iter()
                    .map(|p| PartitionId::new(p.id()))
                    .collect::<Vec<_>>())
            })
            .await
            .map_err(|e| discovery_error(e.to_string()))?
            .map_err(discovery_error)?;

            tracing::debug!(topic = %topic, count = partitions.len(), "Discovered partitions");
            Ok(partitions)
        })
    }

    fn latest_cursor(
        &self,
        partition: PartitionId,
    ) -> Pin<Box<dyn Future<Output = Result<Cursor, StreamError>> + Send + '_>> {
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topic.clone();
        let timeout = self.metadata_timeout;

        Box::pin(async move {
            let cursor_error = |reason: String| StreamError::Cursor { partition, reason };

            let (low, high) = tokio::task::spawn_blocking(move || {
                consumer.fetch_watermarks(&topic, partition.get(), timeout)
            })
            .await
            .map_err(|e| cursor_error(e.to_string()))?
            .map_err(|e| cursor_error(e.to_string()))?;

            tracing::debug!(%partition, low, high, "Fetched watermarks");
            Ok(Cursor::new(partition, high))
        })
    }

    fn poll(
        &self,
        cursor: Cursor,
    ) -> Pin<Box<dyn Future<Output = Result<Batch, StreamError>> + Send + '_>> {
        Box::pin(async move {
            if self.positioned_at() != Some(cursor) {
                self.assign(cursor)?;
                self.set_position(Some(cursor));
            }

            let mut records = Vec::new();
            let mut closed = false;

            while records.len() < self.max_records {
                let wait = if records.is_empty() {
                    self.poll_wait
                } else {
                    DRAIN_WAIT
                };

                match tokio::time::timeout(wait, self.consumer.recv()).await {
                    Err(_elapsed) => break,
                    Ok(Ok(message)) => records.push(StreamRecord {
                        partition: PartitionId::new(message.partition()),
                        offset: message.offset(),
                        data: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    }),
                    Ok(Err(error)) if is_gone(&error) => {
                        tracing::info!(topic = %self.topic, %cursor, error = %error, "Partition no longer exists");
                        closed = true;
                        break;
                    },
                    Ok(Err(error)) => {
                        self.set_position(None);
                        return Err(StreamError::Poll {
                            cursor,
                            reason: error.to_string(),
                        });
                    },
                }
            }

            let next_cursor = if closed {
                None
            } else {
                Some(
                    records
                        .last()
                        .map_or(cursor, |last| Cursor::new(cursor.partition, last.offset + 1)),
                )
            };
            self.set_position(next_cursor);

            Ok(Batch {
                records,
                next_cursor,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaPartitionReader>();
        assert_sync::<RedpandaPartitionReader>();
    }

    #[test]
    fn missing_brokers_is_rejected() {
        assert!(matches!(
            RedpandaPartitionReader::builder().build(),
            Err(ClientError::MissingBrokers)
        ));
    }

    #[tokio::test]
    async fn zero_max_records_counts_as_one() {
        let Ok(reader) = RedpandaPartitionReader::builder()
            .brokers("localhost:9092")
            .max_records(0)
            .build()
        else {
            return;
        };
        assert_eq!(reader.max_records(), 1);
        assert_eq!(reader.topic(), DEFAULT_TOPIC);
    }

    #[test]
    fn vanished_partition_errors_close_the_stream() {
        let gone = KafkaError::MessageConsumption(RDKafkaErrorCode::UnknownTopicOrPartition);
        let other = KafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure);
        assert!(is_gone(&gone));
        assert!(!is_gone(&other));
    }
}
