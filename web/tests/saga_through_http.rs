//! Drives a whole saga through the HTTP intake, the consumer pipeline and the
//! viewer hub.
//!
//! Intake publishes to a recorder; each recorded event is then scheduled on an
//! in-memory stream and the reader runs until the stream drains, the way the
//! consumer picks intake output up from the real topic.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum_test::TestServer;
use chrono::NaiveDate;
use paysaga_core::projection::BillStatus;
use paysaga_runtime::{Pipeline, ReaderConfig, ReaderExit, SagaEnvironment, StreamReader};
use paysaga_testing::{
    InMemoryEventLog, InMemoryProjectionStore, InMemoryStream, RecordingPublisher, SequentialIds,
    test_clock,
};
use paysaga_web::handlers::UserStatus;
use paysaga_web::{AppState, HubHandle, ViewerHub, router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct System {
    server: TestServer,
    intake: RecordingPublisher,
    stream: InMemoryStream,
    event_log: InMemoryEventLog,
    projections: InMemoryProjectionStore,
    hub: HubHandle,
}

impl System {
    fn new() -> Self {
        let intake = RecordingPublisher::new();
        let projections = InMemoryProjectionStore::new();
        let (hub, _task) = ViewerHub::spawn(16);

        let state = AppState::new(
            Arc::new(intake.clone()),
            Arc::new(projections.clone()),
            Arc::new(test_clock()),
            Arc::new(SequentialIds::new("bill")),
            hub.clone(),
        );

        Self {
            server: TestServer::new(router(state)).unwrap(),
            intake,
            stream: InMemoryStream::new("paysaga-events"),
            event_log: InMemoryEventLog::new(),
            projections,
            hub,
        }
    }

    /// Hand the newest intake event to the consumer and run it to completion.
    async fn consume_latest(&self) {
        let event = self.intake.published().pop().expect("intake published nothing");
        self.stream.schedule_event(&event);
        self.stream.close_when_drained();

        let env = SagaEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(SequentialIds::new("promise")),
            Arc::new(self.projections.clone()),
            Arc::new(self.stream.clone()),
            Arc::new(self.hub.clone()),
        );
        let reader = StreamReader::new(
            Arc::new(self.stream.clone()),
            Pipeline::new(Arc::new(self.event_log.clone()), env),
            ReaderConfig::new(Duration::ZERO),
        );

        assert_eq!(reader.run().await.unwrap(), ReaderExit::StreamClosed);
    }

    async fn status(&self, user_id: &str) -> UserStatus {
        self.server
            .get(&format!("/user/{user_id}/status"))
            .await
            .json::<UserStatus>()
    }
}

#[tokio::test]
async fn purchase_to_paid_bill_refreshes_viewers() {
    let system = System::new();
    let mut viewer = system.hub.register().await.unwrap();

    system
        .server
        .post("/purchase")
        .json(&json!({"user_id": "u1", "product_id": "p1", "product_name": "Tea", "amount": 3500}))
        .await
        .assert_status_ok();
    system.consume_latest().await;

    let status = system.status("u1").await;
    assert_eq!(status.promises.len(), 1);
    let promise = &status.promises[0];
    assert_eq!(promise.id, "promise-1");
    assert_eq!(promise.order_id, "order-u1");
    assert_eq!(promise.amount, 3500);
    assert_eq!(promise.due_date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());

    system
        .server
        .post("/create-bill/immediate")
        .json(&json!({"promise_id": promise.id.clone(), "user_id": "u1", "amount": promise.amount}))
        .await
        .assert_status_ok();
    system.consume_latest().await;

    let status = system.status("u1").await;
    assert_eq!(status.bills.len(), 1);
    assert_eq!(status.bills[0].id, "bill-1");
    assert_eq!(status.bills[0].status, BillStatus::Unpaid);
    assert!(viewer.signals.try_recv().is_err(), "no refresh before payment");

    system
        .server
        .post("/webhook/payment-completed")
        .json(&json!({"bill_id": "bill-1", "user_id": "u1", "amount": 3500}))
        .await
        .assert_status_ok();
    system.consume_latest().await;

    let status = system.status("u1").await;
    assert_eq!(status.bills[0].status, BillStatus::Paid);
    assert_eq!(status.bills[0].paid_date, NaiveDate::from_ymd_opt(2024, 1, 1));

    // Round trip through the hub so the broadcast has been handled.
    assert_eq!(system.hub.viewer_count().await.unwrap(), 1);
    assert!(viewer.signals.try_recv().is_ok());

    // Purchase, promise, bill and payment were all logged.
    assert_eq!(system.event_log.len(), 4);
}
