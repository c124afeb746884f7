//! Deduplication and delayed delivery through the subscription client.

use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use session_realtime::transport::{ChangeEvent, ChannelStatus};

mod common;
use common::{message, message_ids, options, settle, statuses, Harness, SESSION};

async fn connected(retry_limit: u32) -> Harness {
    let h = Harness::start(options(retry_limit, 1_000));
    h.client.connect();
    settle().await;
    assert!(h.client.is_connected());
    h
}

#[tokio::test(start_paused = true)]
async fn duplicate_ids_are_delivered_once() {
    let mut h = connected(3).await;

    h.broker.publish(message(SESSION, "abc"));
    h.broker.publish(message(SESSION, "abc"));
    sleep(Duration::from_millis(150)).await;

    assert_eq!(message_ids(&h.drain()), vec!["abc"]);
}

#[tokio::test(start_paused = true)]
async fn delivery_waits_for_the_fixed_delay() {
    let mut h = connected(3).await;
    h.drain();

    h.broker.publish(message(SESSION, "m1"));
    sleep(Duration::from_millis(50)).await;
    assert!(h.drain().is_empty());

    sleep(Duration::from_millis(60)).await;
    assert_eq!(message_ids(&h.drain()), vec!["m1"]);
}

#[tokio::test(start_paused = true)]
async fn zero_delay_delivers_immediately() {
    let mut h = Harness::start(options(3, 1_000).with_delivery_delay(Duration::ZERO));
    h.client.connect();
    settle().await;

    h.broker.publish(message(SESSION, "now"));
    settle().await;
    assert_eq!(message_ids(&h.drain()), vec!["now"]);
}

#[tokio::test(start_paused = true)]
async fn clearing_the_cache_allows_redelivery() {
    let mut h = connected(3).await;

    h.broker.publish(message(SESSION, "abc"));
    sleep(Duration::from_millis(150)).await;
    assert_eq!(message_ids(&h.drain()), vec!["abc"]);

    h.client.clear_message_cache();
    h.broker.publish(message(SESSION, "abc"));
    sleep(Duration::from_millis(150)).await;
    assert_eq!(message_ids(&h.drain()), vec!["abc"]);
}

#[tokio::test(start_paused = true)]
async fn transport_order_is_preserved() {
    let mut h = connected(3).await;

    let ids = ["m1", "m2", "m3", "m2", "m4", "m5"];
    for id in ids {
        h.broker.publish(message(SESSION, id));
        sleep(Duration::from_millis(10)).await;
    }
    sleep(Duration::from_millis(150)).await;

    assert_eq!(message_ids(&h.drain()), vec!["m1", "m2", "m3", "m4", "m5"]);
}

#[tokio::test(start_paused = true)]
async fn numeric_ids_are_deduplicated() {
    let mut h = connected(3).await;

    let row = json!({ "id": 7, "session_id": SESSION });
    h.broker.publish(ChangeEvent::insert("messages", row.clone()));
    h.broker.publish(ChangeEvent::insert("messages", row));
    sleep(Duration::from_millis(150)).await;

    assert_eq!(message_ids(&h.drain()), vec!["7"]);
}

#[tokio::test(start_paused = true)]
async fn messages_without_id_are_always_delivered() {
    let mut h = connected(3).await;
    h.drain();

    let row = json!({ "session_id": SESSION, "content": "anonymous" });
    h.broker.publish(ChangeEvent::insert("messages", row.clone()));
    h.broker.publish(ChangeEvent::insert("messages", row));
    sleep(Duration::from_millis(150)).await;

    assert_eq!(h.drain().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn other_sessions_are_not_delivered() {
    let mut h = connected(3).await;

    h.broker.publish(message("someone-else", "x"));
    h.broker.publish(message(SESSION, "y"));
    sleep(Duration::from_millis(150)).await;

    assert_eq!(message_ids(&h.drain()), vec!["y"]);
}

#[tokio::test(start_paused = true)]
async fn cache_survives_reconnect() {
    let mut h = connected(3).await;

    h.broker.publish(message(SESSION, "abc"));
    h.broker.emit_status(ChannelStatus::Closed);
    sleep(Duration::from_millis(1_100)).await;
    assert!(h.client.is_connected());

    h.broker.publish(message(SESSION, "abc"));
    h.broker.publish(message(SESSION, "def"));
    sleep(Duration::from_millis(150)).await;

    let seen = h.drain();
    assert_eq!(message_ids(&seen), vec!["abc", "def"]);
    assert_eq!(statuses(&seen), vec![true, false, true]);
}

#[tokio::test(start_paused = true)]
async fn pending_deliveries_are_dropped_on_shutdown() {
    let mut h = connected(3).await;
    h.drain();

    h.broker.publish(message(SESSION, "late"));
    settle().await;

    assert!(message_ids(&h.stop().await).is_empty());
}
