use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Returns true if `status` is in the 2xx range.
pub fn is_success_status(status: u16) -> bool {
    (200..=299).contains(&status)
}

/// Response to a bulk request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    /// Status of the request as a whole.
    ///
    /// The HTTP client fills this from the response status line.
    #[serde(default)]
    pub status: u16,
    /// Time spent by the server, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub took: Option<u64>,
    /// Set by the server if at least one item failed.
    #[serde(default)]
    pub errors: bool,
    /// One entry per submitted operation, in submission order.
    #[serde(default)]
    pub items: Vec<BulkResponseItem>,
    /// Request-level error descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// A response item, keyed by the action that produced it (`index`, `delete`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BulkResponseItem(BTreeMap<String, BulkItemResult>);

/// The outcome of a single operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_index", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// `created`, `updated`, `deleted`, `not_found`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl BulkResponse {
    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    /// A human readable description of the request-level error.
    pub fn reason(&self) -> String {
        describe_error(self.error.as_ref())
            .unwrap_or_else(|| format!("bulk request failed with status {}", self.status))
    }
}

impl BulkResponseItem {
    pub fn new(action: impl Into<String>, result: BulkItemResult) -> Self {
        Self(BTreeMap::from([(action.into(), result)]))
    }

    /// The action name and its result.
    pub fn action(&self) -> Option<(&str, &BulkItemResult)> {
        self.0.iter().next().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_result(self) -> Option<BulkItemResult> {
        self.0.into_values().next()
    }
}

impl BulkItemResult {
    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    /// A human readable description of the item error.
    pub fn reason(&self) -> String {
        describe_error(self.error.as_ref())
            .unwrap_or_else(|| format!("operation failed with status {}", self.status))
    }
}

fn describe_error(error: Option<&Value>) -> Option<String> {
    match error? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        other => match other.get("reason").and_then(Value::as_str) {
            Some(reason) => Some(reason.to_string()),
            None => Some(other.to_string()),
        },
    }
}
