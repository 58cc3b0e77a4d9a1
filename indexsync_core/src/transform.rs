//! Maps source records to index documents.
use async_trait::async_trait;
use serde_json::Value;

use crate::source::{BoxError, SourceRecord};

/// Metadata field the index assigns itself. Documents must not carry it.
pub const RESERVED_IDENTITY_FIELD: &str = "_id";

#[async_trait]
pub trait DocumentTransform: Send + Sync {
    /// Returns the document to index for `record`.
    async fn transform(&self, record: &SourceRecord) -> Result<Value, BoxError>;
}

/// Copies the record, removing its identity field.
#[derive(Debug, Clone)]
pub struct StripIdentity {
    field: String,
}

/// Adapts a synchronous closure.
pub struct FnTransform<F> {
    f: F,
}

impl StripIdentity {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Default for StripIdentity {
    fn default() -> Self {
        Self::new(RESERVED_IDENTITY_FIELD)
    }
}

#[async_trait]
impl DocumentTransform for StripIdentity {
    async fn transform(&self, record: &SourceRecord) -> Result<Value, BoxError> {
        let mut document = record.document.clone();

        if let Value::Object(fields) = &mut document {
            fields.remove(&self.field);
            fields.remove(RESERVED_IDENTITY_FIELD);
        }

        Ok(document)
    }
}

impl<F> FnTransform<F>
where
    F: Fn(&SourceRecord) -> Result<Value, BoxError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> DocumentTransform for FnTransform<F>
where
    F: Fn(&SourceRecord) -> Result<Value, BoxError> + Send + Sync,
{
    async fn transform(&self, record: &SourceRecord) -> Result<Value, BoxError> {
        (self.f)(record)
    }
}

/// Returns the reserved field if `document` carries it.
pub fn reserved_field(document: &Value) -> Option<&'static str> {
    match document.get(RESERVED_IDENTITY_FIELD) {
        Some(Value::Null) | None => None,
        Some(_) => Some(RESERVED_IDENTITY_FIELD),
    }
}
