use async_trait::async_trait;

use crate::{BulkRequest, BulkResponse, Result};

/// A client for the bulk-write endpoint of a search index.
///
/// A single client is shared by every batch window, so implementations must be
/// cheap to call concurrently.
#[async_trait]
pub trait BulkClient: Send + Sync {
    /// Submit an ordered batch of operations.
    ///
    /// An error means the request could not be delivered or its response could
    /// not be understood. A response whose own status is outside the success
    /// range is still returned as `Ok`, the caller decides what to do with it.
    async fn bulk(&self, request: BulkRequest) -> Result<BulkResponse>;

    /// Make every write acknowledged so far visible to readers.
    async fn refresh(&self) -> Result<()>;

    /// Count the documents currently visible in the index.
    async fn count(&self) -> Result<u64>;
}
