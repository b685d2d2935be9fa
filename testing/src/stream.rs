//! In-memory stream, publisher and notifier doubles.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use paysaga_core::event::{SagaEvent, encode};
use paysaga_core::notifier::{NotifyError, Notifier};
use paysaga_core::stream::{
    Batch, Cursor, EventPublisher, PartitionId, PublishError, StreamError, StreamRecord,
    StreamSource,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct StreamState {
    partitions: Vec<Vec<Vec<u8>>>,
    // Appended to partition 0 the moment a reader takes its starting cursor.
    scheduled: Vec<Vec<u8>>,
}

/// Partitioned, append-only stream held in memory.
///
/// Implements both [`StreamSource`] and [`EventPublisher`], so a reader wired
/// to it consumes its own output the way the production consumer does.
///
/// Records that exist before [`latest_cursor`](StreamSource::latest_cursor)
/// is called are history and are never delivered. Use
/// [`schedule`](Self::schedule) for records a reader should see.
///
/// Once [`close_when_drained`](Self::close_when_drained) is set, a poll
/// that finds nothing new returns a batch without a next cursor.
#[derive(Clone, Debug)]
pub struct InMemoryStream {
    name: String,
    max_batch: usize,
    state: Arc<RwLock<StreamState>>,
    closing: Arc<AtomicBool>,
    fail_discovery: Arc<AtomicBool>,
    fail_next_poll: Arc<AtomicBool>,
    fail_publish: Arc<AtomicBool>,
    polls: Arc<AtomicUsize>,
}

impl InMemoryStream {
    /// One-partition stream.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_partitions(name, 1)
    }

    /// Stream with `count` partitions. Zero is allowed and makes discovery
    /// return an empty set.
    #[must_use]
    pub fn with_partitions(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            max_batch: 100,
            state: Arc::new(RwLock::new(StreamState {
                partitions: vec![Vec::new(); count],
                scheduled: Vec::new(),
            })),
            closing: Arc::new(AtomicBool::new(false)),
            fail_discovery: Arc::new(AtomicBool::new(false)),
            fail_next_poll: Arc::new(AtomicBool::new(false)),
            fail_publish: Arc::new(AtomicBool::new(false)),
            polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cap the number of records per poll.
    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// Append raw bytes to a partition right now.
    pub fn push_raw(&self, partition: usize, data: impl Into<Vec<u8>>) {
        self.state.write().unwrap().partitions[partition].push(data.into());
    }

    /// Append an encoded event to a partition right now.
    pub fn push_event(&self, partition: usize, event: &SagaEvent) {
        self.push_raw(partition, encode(event).unwrap());
    }

    /// Queue raw bytes to appear on partition 0 just after a reader starts.
    pub fn schedule(&self, data: impl Into<Vec<u8>>) {
        self.state.write().unwrap().scheduled.push(data.into());
    }

    /// Queue an encoded event to appear on partition 0 just after a reader starts.
    pub fn schedule_event(&self, event: &SagaEvent) {
        self.schedule(encode(event).unwrap());
    }

    /// Close the stream once every record has been delivered.
    pub fn close_when_drained(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    /// Make partition discovery fail.
    pub fn fail_discovery(&self) {
        self.fail_discovery.store(true, Ordering::SeqCst);
    }

    /// Make the next poll fail.
    pub fn fail_next_poll(&self) {
        self.fail_next_poll.store(true, Ordering::SeqCst);
    }

    /// Make publishing fail (or succeed again).
    pub fn set_publish_failing(&self, failing: bool) {
        self.fail_publish.store(failing, Ordering::SeqCst);
    }

    /// Raw records of a partition.
    #[must_use]
    pub fn records(&self, partition: usize) -> Vec<Vec<u8>> {
        self.state.read().unwrap().partitions[partition].clone()
    }

    /// How many polls were served.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    fn index(partition: PartitionId) -> Option<usize> {
        usize::try_from(partition.get()).ok()
    }
}

impl StreamSource for InMemoryStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn partitions(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PartitionId>, StreamError>> + Send + '_>> {
        Box::pin(async move {
            if self.fail_discovery.load(Ordering::SeqCst) {
                return Err(StreamError::Discovery {
                    stream: self.name.clone(),
                    reason: "stream not found".to_string(),
                });
            }
            let count = self.state.read().unwrap().partitions.len();
            Ok((0..count)
                .filter_map(|p| i32::try_from(p).ok())
                .map(PartitionId::new)
                .collect())
        })
    }

    fn latest_cursor(
        &self,
        partition: PartitionId,
    ) -> Pin<Box<dyn Future<Output = Result<Cursor, StreamError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            let index = Self::index(partition)
                .filter(|i| *i < state.partitions.len())
                .ok_or_else(|| StreamError::Cursor {
                    partition,
                    reason: "no such partition".to_string(),
                })?;

            let end = state.partitions[index].len();
            if index == 0 {
                let scheduled = std::mem::take(&mut state.scheduled);
                state.partitions[0].extend(scheduled);
            }
            Ok(Cursor::new(partition, i64::try_from(end).unwrap_or(i64::MAX)))
        })
    }

    fn poll(
        &self,
        cursor: Cursor,
    ) -> Pin<Box<dyn Future<Output = Result<Batch, StreamError>> + Send + '_>> {
        Box::pin(async move {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next_poll.swap(false, Ordering::SeqCst) {
                return Err(StreamError::Poll {
                    cursor,
                    reason: "injected poll failure".to_string(),
                });
            }

            let state = self.state.read().unwrap();
            let records = Self::index(cursor.partition)
                .and_then(|i| state.partitions.get(i))
                .ok_or_else(|| StreamError::Poll {
                    cursor,
                    reason: "no such partition".to_string(),
                })?;

            let start = usize::try_from(cursor.offset).unwrap_or(0);
            let batch: Vec<StreamRecord> = records
                .iter()
                .enumerate()
                .skip(start)
                .take(self.max_batch)
                .map(|(offset, data)| StreamRecord {
                    partition: cursor.partition,
                    offset: i64::try_from(offset).unwrap_or(i64::MAX),
                    data: data.clone(),
                })
                .collect();

            let next_cursor = match batch.last() {
                Some(last) => Some(Cursor::new(cursor.partition, last.offset + 1)),
                None if self.closing.load(Ordering::SeqCst) => None,
                None => Some(cursor),
            };

            Ok(Batch {
                records: batch,
                next_cursor,
            })
        })
    }
}

impl EventPublisher for InMemoryStream {
    fn publish(
        &self,
        event: &SagaEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        let encoded = encode(event);
        let event_type = event.event_type();
        Box::pin(async move {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(PublishError::Transport {
                    event_type,
                    reason: "stream rejected record".to_string(),
                });
            }
            self.push_raw(0, encoded?);
            Ok(())
        })
    }
}

/// Publisher that only remembers what it was given.
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    published: Arc<RwLock<Vec<SagaEvent>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingPublisher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following publish fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Events published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<SagaEvent> {
        self.published.read().unwrap().clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(
        &self,
        event: &SagaEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        let event = event.clone();
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PublishError::Transport {
                    event_type: event.event_type(),
                    reason: "publisher unavailable".to_string(),
                });
            }
            self.published.write().unwrap().push(event);
            Ok(())
        })
    }
}

/// Notifier that counts refresh signals.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    signals: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    /// Create a notifier with no signals recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following signal fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful refresh signals.
    #[must_use]
    pub fn count(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }
}

impl Notifier for RecordingNotifier {
    fn notify_refresh(&self) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError::Closed);
            }
            self.signals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysaga_core::event::{PurchaseCompleted, decode};

    fn purchase(user: &str) -> SagaEvent {
        SagaEvent::from(PurchaseCompleted {
            order_id: format!("order-{user}"),
            user_id: user.to_string(),
            amount: 3500,
        })
    }

    #[tokio::test]
    async fn history_is_skipped_and_scheduled_records_are_delivered() {
        let stream = InMemoryStream::new("saga");
        stream.push_event(0, &purchase("old"));
        stream.schedule_event(&purchase("new"));

        let cursor = stream.latest_cursor(PartitionId::new(0)).await.unwrap();
        assert_eq!(cursor.offset, 1);

        let batch = stream.poll(cursor).await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(decode(&batch.records[0].data).unwrap().user_id(), "new");
        assert_eq!(batch.next_cursor, Some(Cursor::new(PartitionId::new(0), 2)));
    }

    #[tokio::test]
    async fn empty_poll_keeps_cursor_until_closed() {
        let stream = InMemoryStream::new("saga");
        let cursor = stream.latest_cursor(PartitionId::new(0)).await.unwrap();

        assert_eq!(stream.poll(cursor).await.unwrap().next_cursor, Some(cursor));

        stream.close_when_drained();
        let batch = stream.poll(cursor).await.unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.next_cursor, None);
    }

    #[tokio::test]
    async fn batches_respect_max_batch() {
        let stream = InMemoryStream::new("saga").with_max_batch(2);
        for user in ["a", "b", "c"] {
            stream.schedule_event(&purchase(user));
        }
        let cursor = stream.latest_cursor(PartitionId::new(0)).await.unwrap();

        let first = stream.poll(cursor).await.unwrap();
        assert_eq!(first.records.len(), 2);
        let second = stream.poll(first.next_cursor.unwrap()).await.unwrap();
        assert_eq!(second.records.len(), 1);
    }

    #[tokio::test]
    async fn published_events_land_on_first_partition() {
        let stream = InMemoryStream::with_partitions("saga", 2);
        stream.publish(&purchase("u1")).await.unwrap();
        assert_eq!(stream.records(0).len(), 1);
        assert!(stream.records(1).is_empty());
    }

    #[tokio::test]
    async fn injected_failures_surface_as_stream_errors() {
        let stream = InMemoryStream::new("saga");
        stream.fail_discovery();
        assert!(matches!(
            stream.partitions().await,
            Err(StreamError::Discovery { .. })
        ));

        let cursor = Cursor::new(PartitionId::new(0), 0);
        stream.fail_next_poll();
        assert!(matches!(stream.poll(cursor).await, Err(StreamError::Poll { .. })));
        assert!(stream.poll(cursor).await.is_ok());
    }

    #[tokio::test]
    async fn recording_doubles_count_calls() {
        let publisher = RecordingPublisher::new();
        publisher.publish(&purchase("u1")).await.unwrap();
        assert_eq!(publisher.published().len(), 1);

        let notifier = RecordingNotifier::new();
        notifier.notify_refresh().await.unwrap();
        notifier.set_failing(true);
        assert_eq!(notifier.notify_refresh().await, Err(NotifyError::Closed));
        assert_eq!(notifier.count(), 1);
    }
}
