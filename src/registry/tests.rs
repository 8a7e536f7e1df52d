use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::*;
use crate::gateway::mock::{CreateFailure, MockQueryGateway};
use crate::gateway::QueryGateway;

struct OrderPlaced;
impl Message for OrderPlaced {
    fn type_name() -> &'static str {
        "orders.Placed"
    }
}

const INBOX: &str = "amqp://orders-service/inbox";

fn inbox_node() -> NodeIdentity {
    NodeIdentity::with_inbox(EndpointAddress::new(INBOX))
}

async fn registry(
    gateway: &Arc<MockQueryGateway>,
    node: NodeIdentity,
    mode: SubscribeMode,
) -> SubscriptionRegistry {
    let store = SubscriptionStore::new(gateway.clone() as Arc<dyn QueryGateway>);
    SubscriptionRegistry::new(store, node, mode).await.unwrap()
}

async fn insert_count(gateway: &MockQueryGateway) -> usize {
    gateway
        .executed_sql()
        .await
        .iter()
        .filter(|sql| sql.contains("INSERT"))
        .count()
}

// --- Bootstrap ---

#[tokio::test]
async fn test_bootstrap_skips_create_when_table_present() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    registry(&gateway, inbox_node(), SubscribeMode::Register).await;

    let executed = gateway.executed_sql().await;
    assert!(executed.iter().any(|sql| sql.contains("sqlite_master")));
    assert!(!executed.iter().any(|sql| sql.starts_with("CREATE TABLE")));
}

#[tokio::test]
async fn test_bootstrap_creates_when_table_absent() {
    let gateway = Arc::new(MockQueryGateway::new());
    registry(&gateway, inbox_node(), SubscribeMode::Register).await;

    let executed = gateway.executed_sql().await;
    assert!(executed.iter().any(|sql| sql.starts_with("CREATE TABLE")));
}

#[tokio::test]
async fn test_bootstrap_swallows_duplicate_create_race() {
    let gateway = Arc::new(MockQueryGateway::new());
    gateway.set_create_failure(CreateFailure::AlreadyExists).await;

    // Construction succeeds despite losing the creation race.
    registry(&gateway, inbox_node(), SubscribeMode::Register).await;
}

#[tokio::test]
async fn test_bootstrap_other_failure_aborts_construction() {
    let gateway = Arc::new(MockQueryGateway::new());
    gateway.set_create_failure(CreateFailure::Fatal).await;

    let store = SubscriptionStore::new(gateway.clone() as Arc<dyn QueryGateway>);
    let err = SubscriptionRegistry::new(store, inbox_node(), SubscribeMode::Register)
        .await
        .err()
        .expect("construction must fail");
    assert!(matches!(err, RegistryError::Bootstrap(_)), "{err:?}");
}

// --- Deferral and lifecycle ---

#[tokio::test]
async fn test_subscribe_before_start_has_no_side_effects() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    // No inbox at all: deferral must still succeed silently.
    let reg = registry(&gateway, NodeIdentity::without_inbox(), SubscribeMode::Register).await;

    reg.subscribe(&[MessageType::new("orders.Placed")]).await.unwrap();
    reg.subscribe_name("billing.InvoiceIssued").await.unwrap();

    assert!(gateway.rows().await.is_empty());
    assert_eq!(insert_count(&gateway).await, 0);
}

#[tokio::test]
async fn test_start_flushes_buffer_once_in_original_order() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Register).await;

    reg.subscribe(&[MessageType::new("orders.Placed")]).await.unwrap();
    reg.subscribe(&[
        MessageType::new("billing.InvoiceIssued"),
        MessageType::new("shipping.Dispatched"),
    ])
    .await
    .unwrap();

    reg.start().await.unwrap();

    assert_eq!(
        gateway.rows().await,
        vec![
            ("orders.Placed".to_string(), INBOX.to_string()),
            ("billing.InvoiceIssued".to_string(), INBOX.to_string()),
            ("shipping.Dispatched".to_string(), INBOX.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_second_start_is_ignored() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Register).await;

    reg.subscribe(&[MessageType::new("orders.Placed")]).await.unwrap();
    reg.start().await.unwrap();
    let inserts_after_first = insert_count(&gateway).await;

    reg.start().await.unwrap();
    assert_eq!(insert_count(&gateway).await, inserts_after_first);
}

#[tokio::test]
async fn test_flush_failure_propagates_with_buffer_drained() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Register).await;

    reg.subscribe(&[MessageType::new("orders.Placed")]).await.unwrap();
    gateway.set_insert_failure(true).await;

    let err = reg.start().await.unwrap_err();
    assert!(matches!(err, RegistryError::Store(_)), "{err:?}");

    // No built-in retry: the buffer was consumed by the failed flush.
    gateway.set_insert_failure(false).await;
    reg.start().await.unwrap();
    assert!(gateway.rows().await.is_empty());
}

#[tokio::test]
async fn test_flush_without_inbox_fails_in_register_mode() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, NodeIdentity::without_inbox(), SubscribeMode::Register).await;

    reg.subscribe(&[MessageType::new("orders.Placed")]).await.unwrap();

    let err = reg.start().await.unwrap_err();
    assert!(matches!(err, RegistryError::InputQueueRequired), "{err:?}");
}

#[tokio::test]
async fn test_post_start_subscribe_registers_directly() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Register).await;

    reg.start().await.unwrap();
    reg.subscribe(&[MessageType::new("orders.Placed")]).await.unwrap();

    assert_eq!(
        gateway.rows().await,
        vec![("orders.Placed".to_string(), INBOX.to_string())]
    );
}

// --- Modes ---

#[tokio::test]
async fn test_register_is_idempotent() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Register).await;
    reg.start().await.unwrap();

    reg.subscribe(&[MessageType::new("orders.Placed")]).await.unwrap();
    reg.subscribe(&[MessageType::new("orders.Placed")]).await.unwrap();

    assert_eq!(gateway.rows().await.len(), 1);
}

#[tokio::test]
async fn test_register_without_inbox_is_invalid() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, NodeIdentity::without_inbox(), SubscribeMode::Register).await;
    reg.start().await.unwrap();

    let err = reg
        .subscribe(&[MessageType::new("orders.Placed")])
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InputQueueRequired), "{err:?}");
}

#[tokio::test]
async fn test_worker_only_node_is_exempt() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, NodeIdentity::worker_only(), SubscribeMode::Register).await;
    reg.start().await.unwrap();

    reg.subscribe(&[MessageType::new("orders.Placed")]).await.unwrap();

    assert!(gateway.rows().await.is_empty());
    assert_eq!(insert_count(&gateway).await, 0);
}

#[tokio::test]
async fn test_ignore_mode_never_touches_store() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    // No inbox configured: ignore mode must still not error.
    let reg = registry(&gateway, NodeIdentity::without_inbox(), SubscribeMode::Ignore).await;
    reg.start().await.unwrap();

    reg.subscribe(&[MessageType::new("orders.Placed")]).await.unwrap();

    let executed = gateway.executed_sql().await;
    // Only the bootstrap probe reached the gateway.
    assert!(executed.iter().all(|sql| sql.contains("sqlite_master")));
}

#[tokio::test]
async fn test_validate_mode_lists_exactly_the_missing_types() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    gateway.insert_row("A", INBOX).await;
    gateway.insert_row("C", INBOX).await;
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Validate).await;
    reg.start().await.unwrap();

    let err = reg
        .subscribe(&[
            MessageType::new("A"),
            MessageType::new("B"),
            MessageType::new("C"),
        ])
        .await
        .unwrap_err();

    match &err {
        RegistryError::MissingSubscriptions { missing } => {
            assert_eq!(missing, &vec!["B".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), "no subscription rows found for: B");

    // Validation performed no mutation.
    assert_eq!(gateway.rows().await.len(), 2);
    assert_eq!(insert_count(&gateway).await, 0);
}

#[tokio::test]
async fn test_validate_mode_aggregates_all_missing_types() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Validate).await;
    reg.start().await.unwrap();

    let err = reg
        .subscribe(&[MessageType::new("A"), MessageType::new("B")])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no subscription rows found for: A, B");
}

#[tokio::test]
async fn test_validate_mode_passes_when_all_present() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    gateway.insert_row("A", INBOX).await;
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Validate).await;
    reg.start().await.unwrap();

    reg.subscribe(&[MessageType::new("A")]).await.unwrap();
}

// --- Convenience forms ---

#[tokio::test]
async fn test_single_type_forms_reduce_to_set_form() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Register).await;
    reg.start().await.unwrap();

    reg.subscribe_name("billing.InvoiceIssued").await.unwrap();
    reg.subscribe_type::<OrderPlaced>().await.unwrap();
    reg.subscribe_message(&OrderPlaced).await.unwrap();

    let rows = gateway.rows().await;
    assert_eq!(rows.len(), 2); // OrderPlaced registered idempotently
    assert!(rows.contains(&("billing.InvoiceIssued".to_string(), INBOX.to_string())));
    assert!(rows.contains(&("orders.Placed".to_string(), INBOX.to_string())));
}

// --- Lookup cache ---

#[tokio::test]
async fn test_lookup_includes_own_inbox_after_register() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Register).await;
    reg.start().await.unwrap();

    reg.subscribe_type::<OrderPlaced>().await.unwrap();

    let uris = reg.subscribed_uris(&OrderPlaced).await.unwrap();
    assert_eq!(uris, vec![EndpointAddress::new(INBOX)]);
}

#[tokio::test]
async fn test_lookup_unknown_type_is_empty_not_error() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Register).await;
    reg.start().await.unwrap();

    let never_seen = MessageType::new("billing.NeverSeen");
    assert!(reg.subscribed_uris_for(&never_seen).await.unwrap().is_empty());

    // The empty result is cached; no second fetch.
    assert!(reg.subscribed_uris_for(&never_seen).await.unwrap().is_empty());
    assert_eq!(gateway.fetch_count("billing.NeverSeen").await, 1);
}

#[tokio::test]
async fn test_lookup_reflects_store_at_first_read_only() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    gateway.insert_row("orders.Placed", "amqp://node-a/inbox").await;
    let reg = registry(&gateway, inbox_node(), SubscribeMode::Register).await;
    reg.start().await.unwrap();

    let placed = MessageType::new("orders.Placed");
    let first = reg.subscribed_uris_for(&placed).await.unwrap();
    assert_eq!(first, vec![EndpointAddress::new("amqp://node-a/inbox")]);

    // Rows persisted after the first read stay invisible.
    gateway.insert_row("orders.Placed", "amqp://node-b/inbox").await;
    let second = reg.subscribed_uris_for(&placed).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(gateway.fetch_count("orders.Placed").await, 1);
}

#[tokio::test]
async fn test_concurrent_lookups_issue_exactly_one_fetch() {
    let gateway = Arc::new(MockQueryGateway::with_schema());
    gateway.insert_row("orders.Placed", "amqp://node-a/inbox").await;
    gateway.insert_row("orders.Placed", "amqp://node-b/inbox").await;
    gateway.set_fetch_delay(Duration::from_millis(20)).await;

    let reg = Arc::new(registry(&gateway, inbox_node(), SubscribeMode::Register).await);
    reg.start().await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let reg = reg.clone();
            tokio::spawn(async move {
                reg.subscribed_uris_for(&MessageType::new("orders.Placed"))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let expected = vec![
        EndpointAddress::new("amqp://node-a/inbox"),
        EndpointAddress::new("amqp://node-b/inbox"),
    ];
    for result in join_all(tasks).await {
        assert_eq!(result.unwrap(), expected);
    }
    assert_eq!(gateway.fetch_count("orders.Placed").await, 1);
}
