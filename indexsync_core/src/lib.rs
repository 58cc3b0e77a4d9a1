//! Coalesces individual index/delete operations into batched bulk requests.
//!
//! ## Data flow
//!
//! **Producer**: [`Indexer`], [`ResyncDriver`] or any caller pushes
//! [`BulkOperation`]s into a [`WindowSequencer`] and gets a
//! [`CompletionHandle`] back.
//!
//! **Sequencer**: routes every operation to the open [`BatchWindow`], opening
//! a new one when the current window started flushing.
//!
//! **Window**: accumulates operations until it is full or its age budget
//! expires, then sends them as one bulk request and resolves each handle from
//! the matching response item.
pub mod error;
pub mod handle;
pub mod indexer;
pub mod metrics;
pub mod options;
pub mod resync;
pub mod sequencer;
pub mod source;
pub mod transform;
pub mod window;

#[cfg(test)]
pub mod test_utils;

pub use indexsync_bulk::{BulkClient, BulkItemResult, BulkOperation};

pub use self::error::{Result, SyncError};
pub use self::handle::CompletionHandle;
pub use self::indexer::Indexer;
pub use self::options::{BatchOptions, ResyncOptions};
pub use self::resync::{ResyncDriver, ResyncError, ResyncSummary};
pub use self::sequencer::{DrainReport, EvictedOutcomes, WindowOutcome, WindowSequencer};
pub use self::source::{BoxError, JsonLinesSource, MemorySource, RecordSource, SourceRecord};
pub use self::transform::{DocumentTransform, FnTransform, RESERVED_IDENTITY_FIELD, StripIdentity};
pub use self::window::{
    BatchWindow, FlushHandle, FlushOutcome, FlushTrigger, WindowReport, WindowState,
};
