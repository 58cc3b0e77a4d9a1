use std::sync::Arc;

use indexsync_bulk::{BulkClientError, BulkItemResult};
use snafu::Snafu;

/// Sync error types.
///
/// Errors are cloned once per pending operation when a whole batch fails, so
/// every source is wrapped in an [`Arc`].
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum SyncError {
    /// The window already started flushing.
    ///
    /// The sequencer handles this internally by opening a new window.
    #[snafu(display("window {window_id} is not accepting operations"))]
    WindowClosed { window_id: u64 },
    /// The bulk endpoint could not be reached or answered with garbage.
    #[snafu(display("transport error: {message}"))]
    Transport {
        message: &'static str,
        source: Arc<BulkClientError>,
    },
    /// The bulk request as a whole was rejected.
    #[snafu(display("batch rejected with status {status}: {reason}"))]
    Batch { status: u16, reason: String },
    /// A single operation was rejected, the rest of the batch was not affected.
    #[snafu(display("operation {position} rejected with status {status}: {reason}"))]
    Item {
        position: usize,
        status: u16,
        reason: String,
        item: BulkItemResult,
    },
    /// A document body sets the field reserved for the document identity.
    #[snafu(display("document {id} sets the reserved field {field}"))]
    ReservedField { id: String, field: &'static str },
    /// The writes were accepted but could not be made visible.
    #[snafu(display("refresh failed after bulk request"))]
    Refresh { source: Arc<BulkClientError> },
    /// The bulk response had no item for this operation.
    #[snafu(display("operation {position} of window {window_id} was not acknowledged"))]
    Unacknowledged { window_id: u64, position: usize },
    #[snafu(display("invalid options: {message}"))]
    InvalidOptions { message: String },
    #[snafu(display("reply channel closed"))]
    ReplyChannelClosed,
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

impl SyncError {
    /// Returns true if the error affected every operation of its window.
    pub fn is_batch_wide(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. } | SyncError::Batch { .. } | SyncError::Refresh { .. }
        )
    }
}
