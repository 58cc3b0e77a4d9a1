#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream::BoxStream};
use indexsync_bulk::MemoryBulkClient;
use indexsync_core::{BatchOptions, BoxError, MemorySource, RecordSource, SourceRecord};
use serde_json::json;

pub const INDEX: &str = "people";

pub fn memory_client() -> Arc<MemoryBulkClient> {
    Arc::new(MemoryBulkClient::new(INDEX))
}

pub fn batch_options(max_batch_size: usize) -> BatchOptions {
    BatchOptions::new(max_batch_size, default_max_batch_age()).expect("batch options")
}

pub fn default_max_batch_age() -> Duration {
    Duration::from_millis(1500)
}

pub fn person(i: usize) -> SourceRecord {
    let id = format!("person-{i}");
    SourceRecord::new(
        id.clone(),
        json!({ "_id": id, "name": format!("Person {i}"), "age": 20 + i % 50 }),
    )
}

pub fn people(count: usize) -> MemorySource {
    (0..count).map(person).collect()
}

/// Yields `records` then fails.
pub struct FailingSource {
    pub records: Vec<SourceRecord>,
    pub message: &'static str,
}

impl RecordSource for FailingSource {
    fn records(&self) -> BoxStream<'_, Result<SourceRecord, BoxError>> {
        let error: BoxError = self.message.into();
        futures::stream::iter(self.records.iter().cloned().map(Ok))
            .chain(futures::stream::once(async move { Err(error) }))
            .boxed()
    }
}

/// Let spawned flushes run to completion.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
