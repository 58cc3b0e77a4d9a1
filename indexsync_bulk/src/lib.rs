//! Boundary types and clients for a search engine's bulk-write endpoint.
//!
//! The sync engine only depends on the [`BulkClient`] trait. Two
//! implementations are provided: [`HttpBulkClient`], talking to an
//! Elasticsearch-compatible HTTP API, and [`MemoryBulkClient`], an
//! in-process index used for tests and dry runs.
mod client;
mod error;
mod http;
mod memory;
mod operation;
mod response;

pub use self::client::BulkClient;
pub use self::error::{BulkClientError, Result};
pub use self::http::HttpBulkClient;
pub use self::memory::{MemoryBulkClient, StoredDocument};
pub use self::operation::{BulkOperation, BulkRequest};
pub use self::response::{BulkItemResult, BulkResponse, BulkResponseItem, is_success_status};
