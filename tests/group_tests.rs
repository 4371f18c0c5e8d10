mod common;

use common::{client, fields, init_tracing};
use pretty_assertions::assert_eq;
use rustmq_streams::{ClientError, GroupCoordinator, GroupStart, MemoryBroker, RecordId};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_ensure_group_twice_succeeds_without_duplicates() {
    init_tracing();
    let broker = Arc::new(MemoryBroker::new());
    let coordinator = GroupCoordinator::new(broker.clone());

    coordinator.ensure_group_exists("orders", "billing").await.unwrap();
    coordinator.ensure_group_exists("orders", "billing").await.unwrap();

    let groups = coordinator.group_info("orders").await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "billing");
    assert_eq!(groups[0].pending, 0);
    assert_eq!(groups[0].last_delivered_id, RecordId::MIN);
}

#[tokio::test]
async fn test_empty_group_rejected_before_broker_call() {
    let broker = Arc::new(MemoryBroker::new());
    let coordinator = GroupCoordinator::new(broker.clone());

    let err = coordinator.ensure_group_exists("orders", "").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert!(!err.is_retryable());
    // The stream would exist if the broker had been asked to create the group.
    assert!(coordinator.group_info("orders").await.unwrap().is_empty());
    assert_eq!(broker.stream_len("orders"), 0);
}

#[tokio::test]
async fn test_group_exists_does_not_create_anything() {
    let broker = Arc::new(MemoryBroker::new());
    let coordinator = GroupCoordinator::new(broker.clone());

    assert!(!coordinator.group_exists("orders", "billing").await.unwrap());
    assert!(coordinator.group_info("orders").await.unwrap().is_empty());

    coordinator.ensure_group_exists("orders", "shipping").await.unwrap();
    assert!(!coordinator.group_exists("orders", "billing").await.unwrap());
    assert!(coordinator.group_exists("orders", "shipping").await.unwrap());
}

#[tokio::test]
async fn test_group_creation_makes_the_stream() {
    let broker = Arc::new(MemoryBroker::new());
    let coordinator = GroupCoordinator::new(broker.clone());

    coordinator.ensure_group_exists("fresh", "g").await.unwrap();
    let client = client(broker.clone(), "c1");
    let messages = client
        .fetch_new_messages("fresh", "g", 10, Duration::from_millis(1))
        .await
        .unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_many_groups_read_independently() {
    let broker = Arc::new(MemoryBroker::new());
    let client = client(broker.clone(), "c1");
    for i in 0..3 {
        client.produce_message("events", &fields(i)).await.unwrap();
    }
    client.create_group_if_not_exists("events", "audit").await.unwrap();
    client.create_group_if_not_exists("events", "search").await.unwrap();

    let block = Duration::from_millis(1);
    let audit = client.fetch_new_messages("events", "audit", 10, block).await.unwrap();
    let search = client.fetch_new_messages("events", "search", 10, block).await.unwrap();
    assert_eq!(audit.len(), 3);
    assert_eq!(search.len(), 3);

    let groups = client.group_info("events").await.unwrap();
    let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["audit", "search"]);
    assert!(groups.iter().all(|g| g.pending == 3 && g.consumers == 1));
}

#[tokio::test]
async fn test_group_started_at_end_sees_only_new_records() {
    let broker = Arc::new(MemoryBroker::new());
    let client = client(broker.clone(), "c1");
    client.produce_message("events", &fields(0)).await.unwrap();

    client
        .coordinator()
        .ensure_group_exists_from("events", "tail", GroupStart::End)
        .await
        .unwrap();
    let id = client.produce_message("events", &fields(1)).await.unwrap();

    let messages = client
        .fetch_new_messages("events", "tail", 10, Duration::from_millis(1))
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, id);
}
