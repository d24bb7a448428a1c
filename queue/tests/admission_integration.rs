//! Admission controller integration tests against the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;
use travio_core::environment::Clock;
use travio_queue::mocks::MockQueueStore;
use travio_queue::{
    AdmissionController, EntryStatus, IDLE_TICKS, JoinStatus, QueueConfig, QueueSettings,
};
use travio_testing::mocks::{ManualClock, test_clock};

type Controller = AdmissionController<MockQueueStore, ManualClock>;

fn controller() -> Controller {
    AdmissionController::new(
        MockQueueStore::new(),
        ManualClock::starting_at(test_clock().now()),
        QueueSettings::default(),
    )
}

fn scenario_config() -> QueueConfig {
    QueueConfig::for_event("evt")
        .with_batch_size(2)
        .with_admission_interval(Duration::from_secs(1))
        .with_token_ttl(Duration::from_secs(60))
}

#[tokio::test]
async fn fifo_admission_in_batches() {
    let controller = controller();
    controller.configure(scenario_config()).await.unwrap();

    for (i, user) in ["u1", "u2", "u3"].iter().enumerate() {
        let outcome = controller.join("evt", user, "session").await.unwrap();
        assert_eq!(outcome.status, JoinStatus::New);
        assert_eq!(outcome.position, i as u64 + 1);
    }

    // First tick.
    let admitted = controller.admit_next("evt").await.unwrap();
    assert_eq!(admitted.len(), 2);
    assert_eq!(admitted[0].user_id, "u1");
    assert_eq!(admitted[1].user_id, "u2");

    let stats = controller.stats("evt").await.unwrap();
    assert_eq!(stats.total_admitted, 2);
    assert_eq!(stats.total_waiting, 1);

    let u1 = controller.position("evt", "u1").await.unwrap();
    let u2 = controller.position("evt", "u2").await.unwrap();
    assert_eq!(u1.status, EntryStatus::Ready);
    assert_eq!(u2.status, EntryStatus::Ready);
    assert_ne!(u1.token, u2.token);

    let u3 = controller.position("evt", "u3").await.unwrap();
    assert_eq!(u3.status, EntryStatus::Waiting);
    assert_eq!(u3.position, 1);

    // Second tick.
    controller.admit_next("evt").await.unwrap();
    assert_eq!(
        controller.position("evt", "u3").await.unwrap().status,
        EntryStatus::Ready
    );

    let ticket = u1.token.unwrap();
    let validated = controller.validate_ticket(&ticket).await.unwrap().unwrap();
    assert_eq!(validated.user_id, "u1");
    assert_eq!(validated.event_id, "evt");

    controller.consume_ticket(&ticket).await.unwrap();
    assert!(controller.validate_ticket(&ticket).await.unwrap().is_none());
    assert_eq!(
        controller.position("evt", "u1").await.unwrap().status,
        EntryStatus::Completed
    );

    // Consuming twice is the same as consuming once.
    controller.consume_ticket(&ticket).await.unwrap();

    controller.shutdown().await;
}

#[tokio::test]
async fn admitted_user_rejoining_gets_ready_entry() {
    let controller = controller();
    controller.configure(scenario_config()).await.unwrap();
    controller.join("evt", "u1", "s").await.unwrap();
    let admitted = controller.admit_next("evt").await.unwrap();

    let again = controller.join("evt", "u1", "s").await.unwrap();
    assert_eq!(again.status, JoinStatus::Existing);
    assert_eq!(again.entry.status, EntryStatus::Ready);
    assert_eq!(again.entry.token.as_deref(), Some(admitted[0].ticket.as_str()));
    assert_eq!(controller.stats("evt").await.unwrap().total_waiting, 0);

    controller.shutdown().await;
}

#[tokio::test]
async fn positions_never_increase_while_waiting() {
    let controller = controller();
    controller.configure(scenario_config().with_batch_size(1)).await.unwrap();
    for i in 0..6 {
        controller.join("evt", &format!("u{i}"), "s").await.unwrap();
    }

    let mut last = controller.position("evt", "u5").await.unwrap().position;
    assert_eq!(last, 6);
    for newcomer in 6..9 {
        controller.join("evt", &format!("u{newcomer}"), "s").await.unwrap();
        controller.admit_next("evt").await.unwrap();
        let now = controller.position("evt", "u5").await.unwrap().position;
        assert!(now <= last);
        last = now;
    }
    assert_eq!(last, 3);

    controller.shutdown().await;
}

#[tokio::test]
async fn disabling_keeps_issued_tickets_valid() {
    let controller = controller();
    controller.configure(scenario_config()).await.unwrap();
    controller.join("evt", "u1", "s").await.unwrap();
    let admitted = controller.admit_next("evt").await.unwrap();

    controller
        .configure(scenario_config().with_enabled(false))
        .await
        .unwrap();
    assert!(!controller.has_worker("evt"));
    assert!(controller.validate_ticket(&admitted[0].ticket).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn worker_admits_on_its_interval() {
    let controller = controller();
    controller.configure(scenario_config()).await.unwrap();
    assert!(controller.has_worker("evt"));

    for user in ["u1", "u2", "u3"] {
        controller.join("evt", user, "s").await.unwrap();
    }

    // Nothing is admitted before the first interval elapses.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(controller.stats("evt").await.unwrap().total_admitted, 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(controller.stats("evt").await.unwrap().total_admitted, 2);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(controller.stats("evt").await.unwrap().total_admitted, 3);

    controller.shutdown().await;
    assert!(!controller.has_worker("evt"));
}

#[tokio::test(start_paused = true)]
async fn reconfiguring_restarts_the_worker() {
    let controller = controller();
    controller.configure(scenario_config()).await.unwrap();
    controller
        .configure(scenario_config().with_admission_interval(Duration::from_secs(10)))
        .await
        .unwrap();
    controller.join("evt", "u1", "s").await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(controller.stats("evt").await.unwrap().total_admitted, 0);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(controller.stats("evt").await.unwrap().total_admitted, 1);

    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn idle_workers_retire_and_restart_on_join() {
    let controller = controller();
    for i in 0..50 {
        let event_id = format!("evt-{i}");
        controller.join(&event_id, "u1", "s").await.unwrap();
        controller.leave(&event_id, "u1").await.unwrap();
    }
    assert_eq!(controller.worker_count(), 50);

    // Default configs tick once a minute.
    tokio::time::sleep(Duration::from_secs(60 * (u64::from(IDLE_TICKS) + 1))).await;
    assert_eq!(controller.worker_count(), 0);
    assert!(!controller.has_worker("evt-0"));

    controller.join("evt-0", "u2", "s").await.unwrap();
    assert!(controller.has_worker("evt-0"));
    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn worker_with_waiting_users_stays_registered() {
    let controller = controller();
    controller
        .configure(scenario_config().with_batch_size(1))
        .await
        .unwrap();
    for i in 0..10 {
        controller.join("evt", &format!("u{i}"), "s").await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    assert!(controller.has_worker("evt"));
    assert_eq!(controller.stats("evt").await.unwrap().total_admitted, 5);

    // Drained after ten ticks, retired a few ticks later.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(controller.stats("evt").await.unwrap().total_waiting, 0);
    assert!(!controller.has_worker("evt"));
}
