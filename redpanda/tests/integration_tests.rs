//! Round trip against a real broker.
//!
//! ```bash
//! docker run -d -p 9092:9092 redpandadata/redpanda redpanda start --overprovisioned --smp 1
//! cargo test -p travio-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures::StreamExt;
use std::time::Duration;
use travio_core::event_bus::EventBus;
use travio_redpanda::RedpandaEventBus;

#[tokio::test]
#[ignore = "Requires Redpanda running on localhost:9092"]
async fn acknowledged_messages_are_not_redelivered() {
    let topic = format!("travio-test-{}", std::process::id());
    let group = format!("{topic}-group");
    let bus = RedpandaEventBus::builder()
        .brokers("localhost:9092")
        .consumer_group(&group)
        .build()
        .unwrap();

    bus.publish(&topic, "k", b"first").await.unwrap();
    bus.publish(&topic, "k", b"second").await.unwrap();

    {
        let mut stream = bus.subscribe(&[&topic]).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(30), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first.payload, b"first");
        first.ack();
        // Second delivery is received but dropped without ack.
        let _ = tokio::time::timeout(Duration::from_secs(30), stream.next()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    let mut stream = bus.subscribe(&[&topic]).await.unwrap();
    let replayed = tokio::time::timeout(Duration::from_secs(30), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(replayed.payload, b"second");
}
