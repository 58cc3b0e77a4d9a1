use serde_json::{Value, json};
use snafu::ResultExt;

use crate::error::{EncodeSnafu, Result};

/// A single bulk instruction, made of one or more request fragments.
///
/// Index operations carry an action line followed by the document body,
/// delete operations only carry the action line.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    fragments: Vec<Value>,
}

/// An ordered batch of operations, ready to be sent to the bulk endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkRequest {
    fragments: Vec<Value>,
    num_operations: usize,
}

impl BulkOperation {
    /// Index (create or replace) the document `id` with `body`.
    pub fn index(index: &str, id: impl Into<String>, body: Value) -> Self {
        let action = json!({ "index": { "_index": index, "_id": id.into() } });
        Self {
            fragments: vec![action, body],
        }
    }

    /// Delete the document `id`.
    pub fn delete(index: &str, id: impl Into<String>) -> Self {
        let action = json!({ "delete": { "_index": index, "_id": id.into() } });
        Self {
            fragments: vec![action],
        }
    }

    /// Wrap fragments built by the caller.
    pub fn from_fragments(fragments: Vec<Value>) -> Self {
        Self { fragments }
    }

    pub fn fragments(&self) -> &[Value] {
        &self.fragments
    }

    pub fn into_fragments(self) -> Vec<Value> {
        self.fragments
    }
}

impl BulkRequest {
    /// Concatenate the fragments of `operations`, keeping their order.
    pub fn from_operations(operations: impl IntoIterator<Item = BulkOperation>) -> Self {
        let mut request = Self::default();
        for operation in operations {
            request.push(operation);
        }
        request
    }

    pub fn push(&mut self, operation: BulkOperation) {
        self.fragments.extend(operation.into_fragments());
        self.num_operations += 1;
    }

    /// Number of operations, not fragments, in the request.
    pub fn len(&self) -> usize {
        self.num_operations
    }

    pub fn is_empty(&self) -> bool {
        self.num_operations == 0
    }

    pub fn fragments(&self) -> &[Value] {
        &self.fragments
    }

    /// Serialize the request as newline delimited JSON.
    pub fn to_ndjson(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        for fragment in &self.fragments {
            serde_json::to_writer(&mut body, fragment).context(EncodeSnafu {
                what: "bulk request fragment",
            })?;
            body.push(b'\n');
        }
        Ok(body)
    }
}
