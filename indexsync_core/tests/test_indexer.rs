use indexsync_bulk::BulkClient;
use indexsync_core::{FlushTrigger, Indexer, SyncError};
use serde_json::json;

mod common;

use common::{INDEX, batch_options, default_max_batch_age, memory_client};

#[tokio::test(start_paused = true)]
async fn test_index_then_delete() {
    let client = memory_client();
    let indexer = Indexer::new(client.clone(), INDEX, batch_options(100));

    let created = indexer.index("1", json!({ "name": "Ada" }));
    let item = created.await.expect("index");
    assert_eq!(item.status, 201);
    assert_eq!(client.count().await.unwrap(), 1);

    let deleted = indexer.delete("1").await.expect("delete");
    assert_eq!(deleted.status, 200);
    assert_eq!(client.count().await.unwrap(), 0);

    let err = indexer.delete("1").await.unwrap_err();
    assert!(matches!(err, SyncError::Item { status: 404, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_writes_are_coalesced_by_age() {
    let client = memory_client();
    let indexer = Indexer::new(client.clone(), INDEX, batch_options(100));
    let start = tokio::time::Instant::now();

    let handles = (0..20)
        .map(|i| indexer.index(i.to_string(), json!({ "n": i })))
        .collect::<Vec<_>>();

    for handle in handles {
        handle.await.expect("index");
    }

    assert!(start.elapsed() >= default_max_batch_age());
    assert_eq!(client.requests().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drain_preserves_partial_success() {
    let client = memory_client();
    client.respond_next_bulk_with_status(500).await;
    let indexer = Indexer::new(client.clone(), INDEX, batch_options(2));

    let handles = (0..4)
        .map(|i| indexer.index(i.to_string(), json!({ "n": i })))
        .collect::<Vec<_>>();

    let report = indexer.drain().await;

    assert_eq!(report.windows.len(), 2);
    assert!(!report.is_success());
    let (window_id, err) = report.failed().next().expect("failed window");
    assert_eq!(window_id, 0);
    assert!(matches!(err, SyncError::Batch { status: 500, .. }));
    assert_eq!(report.succeeded_operations(), 2);

    let results = futures::future::join_all(handles).await;
    assert!(results[..2].iter().all(Result::is_err));
    assert!(results[2..].iter().all(Result::is_ok));
}

#[tokio::test(start_paused = true)]
async fn test_forced_flush_skips_age_budget() {
    let client = memory_client();
    let indexer = Indexer::new(client.clone(), INDEX, batch_options(100));

    let handle = indexer.index("1", json!({ "name": "Ada" }));
    let report = indexer
        .flush()
        .expect("current window")
        .await
        .expect("flush");

    assert_eq!(report.trigger, FlushTrigger::Forced);
    assert_eq!(report.succeeded, 1);
    handle.await.expect("index");
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_endpoint_rejects_window() {
    let client = memory_client();
    client.fail_next_bulk("connection refused").await;
    let indexer = Indexer::new(client.clone(), INDEX, batch_options(2));

    let first = indexer.index("1", json!({}));
    let second = indexer.index("2", json!({}));

    assert!(matches!(first.await, Err(SyncError::Transport { .. })));
    assert!(matches!(second.await, Err(SyncError::Transport { .. })));

    // The next window is not affected.
    let third = indexer.index("3", json!({}));
    let flush = indexer.flush().expect("current window");
    flush.await.expect("flush");
    third.await.expect("index");
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_rejects_window() {
    let client = memory_client();
    client.fail_next_refresh("refresh timed out").await;
    let indexer = Indexer::new(client.clone(), INDEX, batch_options(1));

    let err = indexer.index("1", json!({})).await.unwrap_err();

    assert!(matches!(err, SyncError::Refresh { .. }));
    assert!(err.is_batch_wide());
}
