//! In-memory implementation of the bulk endpoint.
//!
//! Writes are applied to a working copy of the index and only become visible
//! to [`BulkClient::count`] and [`MemoryBulkClient::document`] after a
//! refresh, like on a real search engine.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::{
    BulkClient, BulkItemResult, BulkRequest, BulkResponse, BulkResponseItem,
    error::{BulkClientError, Result},
};

/// A document stored in the in-memory index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub source: Value,
    pub version: u64,
}

#[derive(Debug)]
enum BulkFault {
    Unavailable(String),
    Status(u16),
}

#[derive(Debug, Default)]
struct MemoryIndexStore {
    /// Documents written so far, visible or not.
    working: BTreeMap<String, StoredDocument>,
    /// Documents visible to readers, as of the last refresh.
    visible: BTreeMap<String, StoredDocument>,
    /// Every request received, in order.
    requests: Vec<BulkRequest>,
    refreshes: usize,
    next_auto_id: u64,
    bulk_faults: VecDeque<BulkFault>,
    refresh_faults: VecDeque<String>,
}

/// In-memory bulk endpoint for a single index.
#[derive(Debug)]
pub struct MemoryBulkClient {
    index: String,
    store: Mutex<MemoryIndexStore>,
}

impl MemoryBulkClient {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            store: Mutex::new(MemoryIndexStore::default()),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Make the next bulk call fail as if the endpoint was unreachable.
    pub async fn fail_next_bulk(&self, message: impl Into<String>) {
        let mut store = self.store.lock().await;
        store
            .bulk_faults
            .push_back(BulkFault::Unavailable(message.into()));
    }

    /// Make the next bulk call answer with `status` without applying anything.
    pub async fn respond_next_bulk_with_status(&self, status: u16) {
        let mut store = self.store.lock().await;
        store.bulk_faults.push_back(BulkFault::Status(status));
    }

    /// Make the next refresh call fail.
    pub async fn fail_next_refresh(&self, message: impl Into<String>) {
        let mut store = self.store.lock().await;
        store.refresh_faults.push_back(message.into());
    }

    /// The requests received so far.
    pub async fn requests(&self) -> Vec<BulkRequest> {
        self.store.lock().await.requests.clone()
    }

    pub async fn refresh_count(&self) -> usize {
        self.store.lock().await.refreshes
    }

    /// Returns the visible version of document `id`.
    pub async fn document(&self, id: &str) -> Option<StoredDocument> {
        self.store.lock().await.visible.get(id).cloned()
    }
}

#[async_trait]
impl BulkClient for MemoryBulkClient {
    async fn bulk(&self, request: BulkRequest) -> Result<BulkResponse> {
        let mut store = self.store.lock().await;
        store.requests.push(request.clone());

        match store.bulk_faults.pop_front() {
            Some(BulkFault::Unavailable(message)) => {
                return Err(BulkClientError::Unavailable { message });
            }
            Some(BulkFault::Status(status)) => {
                return Ok(BulkResponse {
                    status,
                    error: Some(json!({
                        "type": "injected_failure",
                        "reason": format!("bulk request rejected with status {status}"),
                    })),
                    ..Default::default()
                });
            }
            None => {}
        }

        let items = store.apply(&self.index, request.fragments());
        let errors = items
            .iter()
            .filter_map(BulkResponseItem::action)
            .any(|(_, result)| !result.is_success());

        Ok(BulkResponse {
            status: 200,
            took: Some(0),
            errors,
            items,
            error: None,
        })
    }

    async fn refresh(&self) -> Result<()> {
        let mut store = self.store.lock().await;

        if let Some(message) = store.refresh_faults.pop_front() {
            return Err(BulkClientError::Unavailable { message });
        }

        store.visible = store.working.clone();
        store.refreshes += 1;

        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.store.lock().await.visible.len() as u64)
    }
}

impl MemoryIndexStore {
    fn apply(&mut self, index: &str, fragments: &[Value]) -> Vec<BulkResponseItem> {
        let mut items = Vec::new();
        let mut fragments = fragments.iter();

        while let Some(action_line) = fragments.next() {
            let Some((action, metadata)) = action_line.as_object().and_then(|a| a.iter().next())
            else {
                items.push(BulkResponseItem::new(
                    "unknown",
                    error_result(index, None, 400, "malformed action line"),
                ));
                continue;
            };

            let id = metadata
                .get("_id")
                .and_then(Value::as_str)
                .map(str::to_string);

            let item = match action.as_str() {
                "index" | "create" | "update" => {
                    let Some(body) = fragments.next() else {
                        items.push(BulkResponseItem::new(
                            action.as_str(),
                            error_result(index, id, 400, "missing document body"),
                        ));
                        break;
                    };
                    self.write(index, action, id, body)
                }
                "delete" => self.delete(index, id),
                _ => error_result(index, id, 400, "unknown action"),
            };

            items.push(BulkResponseItem::new(action.as_str(), item));
        }

        items
    }

    fn write(
        &mut self,
        index: &str,
        action: &str,
        id: Option<String>,
        body: &Value,
    ) -> BulkItemResult {
        let id = match (action, id) {
            (_, Some(id)) => id,
            ("update", None) => return error_result(index, None, 400, "update requires an id"),
            (_, None) => {
                self.next_auto_id += 1;
                format!("auto-{}", self.next_auto_id)
            }
        };

        let existing = self.working.get(&id);

        let source = match (action, existing) {
            ("create", Some(_)) => {
                return error_result(index, Some(id), 409, "document already exists");
            }
            ("update", None) => {
                return error_result(index, Some(id), 404, "document missing");
            }
            ("update", Some(current)) => {
                let Some(patch) = body.get("doc").and_then(Value::as_object) else {
                    return error_result(index, Some(id), 400, "update body requires a doc");
                };
                let mut merged = current.source.clone();
                if let Some(target) = merged.as_object_mut() {
                    for (key, value) in patch {
                        target.insert(key.clone(), value.clone());
                    }
                }
                merged
            }
            _ => body.clone(),
        };

        let (version, status, result) = match existing {
            Some(current) => (current.version + 1, 200, "updated"),
            None => (1, 201, "created"),
        };

        self.working
            .insert(id.clone(), StoredDocument { source, version });

        BulkItemResult {
            index: Some(index.to_string()),
            id: Some(id),
            version: Some(version),
            result: Some(result.to_string()),
            status,
            error: None,
        }
    }

    fn delete(&mut self, index: &str, id: Option<String>) -> BulkItemResult {
        let Some(id) = id else {
            return error_result(index, None, 400, "delete requires an id");
        };

        match self.working.remove(&id) {
            Some(removed) => BulkItemResult {
                index: Some(index.to_string()),
                id: Some(id),
                version: Some(removed.version + 1),
                result: Some("deleted".to_string()),
                status: 200,
                error: None,
            },
            None => BulkItemResult {
                index: Some(index.to_string()),
                id: Some(id),
                version: None,
                result: Some("not_found".to_string()),
                status: 404,
                error: None,
            },
        }
    }
}

fn error_result(index: &str, id: Option<String>, status: u16, reason: &str) -> BulkItemResult {
    BulkItemResult {
        index: Some(index.to_string()),
        id,
        version: None,
        result: None,
        status,
        error: Some(json!({ "type": "memory_index_exception", "reason": reason })),
    }
}
