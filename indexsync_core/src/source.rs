//! Where resync records come from.
use std::{
    error::Error,
    path::{Path, PathBuf},
};

use futures::{
    StreamExt, TryStreamExt, future,
    stream::{self, BoxStream},
};
use serde_json::Value;
use snafu::{ResultExt, Snafu};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::transform::RESERVED_IDENTITY_FIELD;

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A record of the system of record, not yet transformed.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Identity of the record, used as the document id.
    pub id: String,
    pub document: Value,
}

/// A finite stream of records to copy into the index.
pub trait RecordSource: Send + Sync {
    /// Returns the records, starting from the first one on every call.
    fn records(&self) -> BoxStream<'_, Result<SourceRecord, BoxError>>;
}

/// A source backed by a vector.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<SourceRecord>,
}

/// A source reading one JSON document per line.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    id_field: String,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SourceError {
    #[snafu(display("Failed to open {}", path.display()))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to read {}", path.display()))]
    Read {
        path: PathBuf,
        source: LinesCodecError,
    },
    #[snafu(display("Invalid JSON at line {line}"))]
    Json {
        line: usize,
        source: serde_json::Error,
    },
    #[snafu(display("Missing identity field {field} at line {line}"))]
    MissingIdentity { line: usize, field: String },
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, document: Value) -> Self {
        Self {
            id: id.into(),
            document,
        }
    }
}

impl MemorySource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<SourceRecord> for MemorySource {
    fn from_iter<I: IntoIterator<Item = SourceRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl RecordSource for MemorySource {
    fn records(&self) -> BoxStream<'_, Result<SourceRecord, BoxError>> {
        stream::iter(self.records.iter().cloned().map(Ok)).boxed()
    }
}

impl JsonLinesSource {
    /// Read records from `path`, taking their identity from `_id`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_field: RESERVED_IDENTITY_FIELD.to_string(),
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    fn parse_line(&self, line: usize, text: &str) -> Result<SourceRecord, SourceError> {
        let document: Value = serde_json::from_str(text).context(JsonSnafu { line })?;

        let id = document
            .get(&self.id_field)
            .and_then(identity_to_string)
            .ok_or_else(|| SourceError::MissingIdentity {
                line,
                field: self.id_field.clone(),
            })?;

        Ok(SourceRecord { id, document })
    }
}

impl RecordSource for JsonLinesSource {
    fn records(&self) -> BoxStream<'_, Result<SourceRecord, BoxError>> {
        let path = self.path.clone();

        stream::once(tokio::fs::File::open(self.path.clone()))
            .map(move |file| {
                let file = file.context(OpenSnafu { path: path.clone() })?;
                let read = ReadSnafu { path: path.clone() };
                let lines = FramedRead::new(file, LinesCodec::new())
                    .map(move |line| line.context(read.clone()));
                Ok::<_, SourceError>(lines)
            })
            .try_flatten()
            .enumerate()
            .filter_map(move |(index, line)| {
                let record = match line {
                    Ok(text) if text.trim().is_empty() => None,
                    Ok(text) => Some(self.parse_line(index + 1, &text)),
                    Err(err) => Some(Err(err)),
                };
                future::ready(record)
            })
            .map_err(BoxError::from)
            .boxed()
    }
}

/// Accepts string and numeric identities, and extended JSON object ids.
fn identity_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        Value::Object(object) => object
            .get("$oid")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_memory_source_restarts() {
        let source: MemorySource = (0..3)
            .map(|i| SourceRecord::new(i.to_string(), json!({ "n": i })))
            .collect();

        let first = source.records().try_collect::<Vec<_>>().await.unwrap();
        let second = source.records().try_collect::<Vec<_>>().await.unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_json_lines_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"_id": "a", "name": "Ada"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"_id": 2, "name": "Grace"}}"#).unwrap();
        writeln!(file, r#"{{"_id": {{"$oid": "65f0"}}, "name": "Linus"}}"#).unwrap();

        let source = JsonLinesSource::new(file.path());
        let records = source.records().try_collect::<Vec<_>>().await.unwrap();

        let ids = records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "2", "65f0"]);
        assert_eq!(records[1].document["name"], "Grace");
    }

    #[tokio::test]
    async fn test_json_lines_custom_id_field() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"uuid": "x1", "name": "Ada"}}"#).unwrap();

        let source = JsonLinesSource::new(file.path()).with_id_field("uuid");
        let records = source.records().try_collect::<Vec<_>>().await.unwrap();

        assert_eq!(records[0].id, "x1");
    }

    #[tokio::test]
    async fn test_json_lines_invalid_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"_id": "a"}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let source = JsonLinesSource::new(file.path());
        let mut records = source.records();

        assert!(records.next().await.unwrap().is_ok());
        let err = records.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_json_lines_missing_identity() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"name": "Ada"}}"#).unwrap();

        let source = JsonLinesSource::new(file.path());
        let err = source
            .records()
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Missing identity field _id"));
    }

    #[tokio::test]
    async fn test_json_lines_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonLinesSource::new(dir.path().join("missing.ndjson"));

        let mut records = source.records();
        assert!(records.next().await.unwrap().is_err());
        assert!(records.next().await.is_none());
    }
}
