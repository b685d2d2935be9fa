use crate::{ClientError, DEFAULT_PARTITION_KEY, DEFAULT_TOPIC};
use paysaga_core::event::{SagaEvent, encode};
use paysaga_core::stream::{EventPublisher, PublishError};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Publishes saga events to a Redpanda topic.
///
/// Payloads are the flat JSON envelope produced by
/// [`encode`](paysaga_core::event::encode).
///
/// # Example
///
/// ```no_run
/// use paysaga_redpanda::RedpandaPublisher;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let publisher = RedpandaPublisher::builder()
///     .brokers("localhost:9092")
///     .topic("paysaga-events")
///     .producer_acks("all")
///     .timeout(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaPublisher {
    producer: FutureProducer,
    topic: String,
    partition_key: String,
    timeout: Duration,
}

impl RedpandaPublisher {
    /// Create a publisher with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Create`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, ClientError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the publisher.
    #[must_use]
    pub fn builder() -> RedpandaPublisherBuilder {
        RedpandaPublisherBuilder::default()
    }

    /// Topic records are written to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Key every record is written with.
    #[must_use]
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }
}

/// Builder for configuring a [`RedpandaPublisher`].
#[derive(Default)]
pub struct RedpandaPublisherBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    partition_key: Option<String>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
}

impl RedpandaPublisherBuilder {
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

    /// Set the partition key. Default: `partition-key-1`.
    #[must_use]
    pub fn partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the [`RedpandaPublisher`].
    ///
    /// # Errors
    ///
    /// - [`ClientError::MissingBrokers`] if no brokers were set
    /// - [`ClientError::Create`] if rdkafka rejects the configuration
    pub fn build(self) -> Result<RedpandaPublisher, ClientError> {
        let brokers = self.brokers.ok_or(ClientError::MissingBrokers)?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", &acks)
            .create()
            .map_err(|e| ClientError::Create {
                client: "producer",
                reason: e.to_string(),
            })?;

        let publisher = RedpandaPublisher {
            producer,
            topic: self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            partition_key: self
                .partition_key
                .unwrap_or_else(|| DEFAULT_PARTITION_KEY.to_string()),
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
        };

        tracing::info!(
            brokers = %brokers,
            topic = %publisher.topic,
            partition_key = %publisher.partition_key,
            acks = %acks,
            "RedpandaPublisher created"
        );

        Ok(publisher)
    }
}

impl EventPublisher for RedpandaPublisher {
    fn publish(
        &self,
        event: &SagaEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        let payload = encode(event);
        let event_type = event.event_type();

        Box::pin(async move {
            let payload = payload?;
            let record = FutureRecord::to(&self.topic)
                .payload(&payload)
                .key(&self.partition_key);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %self.topic,
                        partition,
                        offset,
                        %event_type,
                        "Event published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %self.topic,
                        %event_type,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(PublishError::Transport {
                        event_type,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaPublisher>();
        assert_sync::<RedpandaPublisher>();
    }

    #[test]
    fn missing_brokers_is_rejected() {
        assert!(matches!(
            RedpandaPublisher::builder().topic("t").build(),
            Err(ClientError::MissingBrokers)
        ));
    }

    #[test]
    fn defaults_keep_saga_on_one_key() {
        let Ok(publisher) = RedpandaPublisher::new("localhost:9092") else {
            return;
        };
        assert_eq!(publisher.topic(), DEFAULT_TOPIC);
        assert_eq!(publisher.partition_key(), DEFAULT_PARTITION_KEY);
    }
}
