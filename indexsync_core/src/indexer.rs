use std::sync::Arc;

use indexsync_bulk::{BulkClient, BulkOperation};
use serde_json::Value;

use crate::{
    error::SyncError,
    handle::CompletionHandle,
    options::BatchOptions,
    sequencer::{DrainReport, WindowSequencer},
    transform::reserved_field,
    window::FlushHandle,
};

/// Mirrors single document writes into one index, coalescing them into bulk
/// requests.
pub struct Indexer {
    index: String,
    sequencer: WindowSequencer,
}

impl Indexer {
    pub fn new(
        client: Arc<dyn BulkClient>,
        index: impl Into<String>,
        options: BatchOptions,
    ) -> Self {
        Self {
            index: index.into(),
            sequencer: WindowSequencer::new(client, options),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Index (create or replace) the document `id`.
    ///
    /// The handle is rejected right away if `body` sets the reserved `_id`
    /// field, nothing is sent in that case.
    pub fn index(&self, id: impl Into<String>, body: Value) -> CompletionHandle {
        let id = id.into();

        if let Some(field) = reserved_field(&body) {
            return CompletionHandle::rejected(SyncError::ReservedField { id, field });
        }

        self.sequencer.push(BulkOperation::index(&self.index, id, body))
    }

    /// Delete the document `id`.
    pub fn delete(&self, id: impl Into<String>) -> CompletionHandle {
        self.sequencer.push(BulkOperation::delete(&self.index, id))
    }

    /// Flush the window being filled, if any.
    pub fn flush(&self) -> Option<FlushHandle> {
        self.sequencer.force_flush_current()
    }

    /// Wait until every pushed operation was flushed.
    pub async fn drain(&self) -> DrainReport {
        self.sequencer.drain().await
    }

    pub fn sequencer(&self) -> &WindowSequencer {
        &self.sequencer
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_utils::{ScriptedBulkClient, batch_options, document};

    #[tokio::test(start_paused = true)]
    async fn test_index_and_delete_share_a_window() {
        let client = Arc::new(ScriptedBulkClient::default());
        let indexer = Indexer::new(client.clone(), "people", batch_options(10));

        let indexed = indexer.index("1", json!({ "name": "Ada" }));
        let deleted = indexer.delete("2");

        indexer.flush().unwrap().await.unwrap();
        indexed.await.unwrap();
        deleted.await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].len(), 2);
        assert_eq!(
            requests[0].fragments()[2],
            json!({ "delete": { "_index": "people", "_id": "2" } })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserved_field_rejected_without_request() {
        let client = Arc::new(ScriptedBulkClient::default());
        let indexer = Indexer::new(client.clone(), "people", batch_options(10));

        let err = indexer.index("1", document("1", "Ada")).await.unwrap_err();

        assert!(matches!(err, SyncError::ReservedField { field: "_id", .. }));
        assert!(indexer.sequencer().is_empty());
        assert!(indexer.drain().await.windows.is_empty());
        assert!(client.requests().is_empty());
    }
}
