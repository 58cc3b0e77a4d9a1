use std::{
    fmt::Debug,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use indexsync_bulk::{BulkItemResult, BulkOperation};
use tokio::sync::oneshot;

use crate::error::{Result, SyncError};

pub type ItemReplySender = oneshot::Sender<Result<BulkItemResult>>;

/// Resolves to the outcome of a single pushed operation.
///
/// The handle can be dropped at any time, the operation is still sent and
/// its outcome is discarded.
#[must_use = "dropping the handle discards the outcome of the operation"]
#[derive(Debug)]
pub struct CompletionHandle {
    rx: oneshot::Receiver<Result<BulkItemResult>>,
}

/// An operation waiting in a window, together with its reply channel.
pub struct PendingEntry {
    pub operation: BulkOperation,
    pub reply: ItemReplySender,
}

/// Replies that must all be rejected with the same error.
#[must_use]
pub struct ReplyFanout {
    replies: Vec<ItemReplySender>,
    error: SyncError,
}

impl CompletionHandle {
    pub(crate) fn new() -> (ItemReplySender, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A handle that is already rejected with `error`.
    pub fn rejected(error: SyncError) -> Self {
        let (tx, handle) = Self::new();
        let _ = tx.send(Err(error));
        handle
    }
}

impl Future for CompletionHandle {
    type Output = Result<BulkItemResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|reply| reply.unwrap_or(Err(SyncError::ReplyChannelClosed)))
    }
}

impl PendingEntry {
    pub fn new(operation: BulkOperation) -> (Self, CompletionHandle) {
        let (reply, handle) = CompletionHandle::new();
        (Self { operation, reply }, handle)
    }
}

impl ReplyFanout {
    pub fn new(error: SyncError, replies: Vec<ItemReplySender>) -> Self {
        Self { replies, error }
    }

    pub fn send_to_all(self) {
        for reply in self.replies {
            let _ = reply.send(Err(self.error.clone()));
        }
    }
}

impl Debug for PendingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingEntry")
            .field("operation", &self.operation)
            .finish()
    }
}
