use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use indexsync_bulk::{
    BulkClient, BulkClientError, BulkItemResult, BulkOperation, BulkRequest, BulkResponse,
    BulkResponseItem,
};
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use crate::options::BatchOptions;

/// What the next bulk call answers.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Overall status, no items.
    Status(u16),
    /// Overall 200 with one item per status.
    Items(Vec<u16>),
    /// Overall 200 with one successful item per id.
    Ids(Vec<String>),
    /// Transport failure.
    Unavailable(String),
}

/// A bulk client that records requests and answers from a script.
///
/// Without a script, every operation succeeds with status 201.
#[derive(Default)]
pub struct ScriptedBulkClient {
    requests: Mutex<Vec<BulkRequest>>,
    script: Mutex<VecDeque<ScriptedResponse>>,
    refresh_failures: Mutex<VecDeque<String>>,
    refreshes: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedBulkClient {
    /// A client whose bulk calls block until [`ScriptedBulkClient::open_gate`].
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Default::default()
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1 << 20);
        }
    }

    pub fn script(&self, response: ScriptedResponse) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn fail_next_refresh(&self, message: &str) {
        self.refresh_failures
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn requests(&self) -> Vec<BulkRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BulkClient for ScriptedBulkClient {
    async fn bulk(&self, request: BulkRequest) -> indexsync_bulk::Result<BulkResponse> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let ids = request_ids(&request);
        self.requests.lock().unwrap().push(request);

        let scripted = self.script.lock().unwrap().pop_front();
        let items = match scripted {
            None => ids.into_iter().map(|id| item(Some(id), 201)).collect(),
            Some(ScriptedResponse::Status(status)) => {
                return Ok(BulkResponse {
                    status,
                    error: Some(json!({ "reason": "scripted failure" })),
                    ..Default::default()
                });
            }
            Some(ScriptedResponse::Unavailable(message)) => {
                return Err(BulkClientError::Unavailable { message });
            }
            Some(ScriptedResponse::Items(statuses)) => statuses
                .into_iter()
                .enumerate()
                .map(|(i, status)| item(ids.get(i).cloned(), status))
                .collect(),
            Some(ScriptedResponse::Ids(ids)) => {
                ids.into_iter().map(|id| item(Some(id), 201)).collect()
            }
        };

        Ok(BulkResponse {
            status: 200,
            items,
            ..Default::default()
        })
    }

    async fn refresh(&self) -> indexsync_bulk::Result<()> {
        if let Some(message) = self.refresh_failures.lock().unwrap().pop_front() {
            return Err(BulkClientError::Unavailable { message });
        }

        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count(&self) -> indexsync_bulk::Result<u64> {
        Ok(0)
    }
}

fn request_ids(request: &BulkRequest) -> Vec<String> {
    request
        .fragments()
        .iter()
        .filter_map(|fragment| {
            ["index", "create", "update", "delete"]
                .iter()
                .find_map(|action| fragment.get(*action))
        })
        .map(|meta| meta["_id"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn item(id: Option<String>, status: u16) -> BulkResponseItem {
    let error = (status >= 300).then(|| json!({ "reason": format!("status {status}") }));
    BulkResponseItem::new(
        "index",
        BulkItemResult {
            index: Some("people".to_string()),
            id,
            status,
            error,
            ..Default::default()
        },
    )
}

pub fn batch_options(max_batch_size: usize) -> BatchOptions {
    BatchOptions::new(max_batch_size, Duration::from_millis(1500)).expect("valid options")
}

pub fn index_op(id: usize) -> BulkOperation {
    BulkOperation::index("people", id.to_string(), json!({ "n": id }))
}

pub fn document(id: &str, name: &str) -> Value {
    json!({ "_id": id, "name": name })
}
