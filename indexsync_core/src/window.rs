//! A single accumulation period that ends in exactly one bulk request.
//!
//! A window moves through three states:
//!
//! - **Open**: operations can be pushed.
//! - **Flushing**: the bulk request is in flight, the window is read-only.
//! - **Done**: every pending handle has been fulfilled.
//!
//! The transition out of `Open` happens under the same lock as `push`, so a
//! window never sends more than one request and never accepts an operation
//! after its request was built.
//!
//! The age timer only holds a weak reference while the window is empty. The
//! first push hands it a strong one, so pushed operations are sent even if
//! every other reference to the window is dropped.
use std::{
    fmt::{self, Debug},
    future::IntoFuture,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::future::BoxFuture;
use indexsync_bulk::{BulkClient, BulkOperation, BulkRequest, BulkResponse, BulkResponseItem};
use indexsync_observability::KeyValue;
use tokio::{
    sync::{oneshot, watch},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    error::{BatchSnafu, ReplyChannelClosedSnafu, Result, SyncError},
    handle::{CompletionHandle, ItemReplySender, PendingEntry, ReplyFanout},
    metrics::SyncMetrics,
    options::BatchOptions,
};

/// The result of flushing a window, shared by every observer.
pub type FlushOutcome = Result<WindowReport>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Open,
    Flushing,
    Done,
}

/// What caused a window to flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The window reached its maximum size.
    Full,
    /// The window reached its maximum age.
    Timer,
    /// The caller asked for it.
    Forced,
}

/// Summary of a flushed window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReport {
    pub window_id: u64,
    pub trigger: FlushTrigger,
    /// Operations sent in the bulk request.
    pub operations: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Operations without a matching item in the response.
    pub unacknowledged: usize,
    /// Time between the start of the flush and the last handle being fulfilled.
    pub took: Duration,
}

/// Accumulates operations until full or expired, then flushes them once.
pub struct BatchWindow {
    id: u64,
    options: BatchOptions,
    client: Arc<dyn BulkClient>,
    metrics: Arc<SyncMetrics>,
    inner: Mutex<WindowInner>,
    outcome: watch::Sender<Option<FlushOutcome>>,
}

/// Waits for a window to be done.
#[derive(Debug)]
pub struct FlushHandle {
    window_id: u64,
    rx: watch::Receiver<Option<FlushOutcome>>,
}

struct WindowInner {
    state: WindowState,
    entries: Vec<PendingEntry>,
    /// Number of operations ever pushed, entries are moved out when flushing.
    len: usize,
    /// Hands the window to its timer on the first push.
    arm_alarm: Option<oneshot::Sender<Arc<BatchWindow>>>,
}

enum Transition {
    Flush(Vec<PendingEntry>),
    Empty,
    Reschedule,
    AlreadyStarted,
}

impl BatchWindow {
    /// Open a new window and start its age timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(id: u64, client: Arc<dyn BulkClient>, options: BatchOptions) -> Arc<Self> {
        Self::open_with_metrics(id, client, options, Default::default())
    }

    pub(crate) fn open_with_metrics(
        id: u64,
        client: Arc<dyn BulkClient>,
        options: BatchOptions,
        metrics: Arc<SyncMetrics>,
    ) -> Arc<Self> {
        let (outcome, _) = watch::channel(None);
        let (arm_alarm, armed) = oneshot::channel();
        let window = Arc::new(Self {
            id,
            options,
            client,
            metrics,
            inner: Mutex::new(WindowInner {
                state: WindowState::Open,
                entries: Vec::with_capacity(options.max_batch_size().min(1024)),
                len: 0,
                arm_alarm: Some(arm_alarm),
            }),
            outcome,
        });

        window.schedule_alarm(armed);
        window
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn state(&self) -> WindowState {
        self.lock_inner().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == WindowState::Open
    }

    /// Number of operations pushed into the window.
    pub fn len(&self) -> usize {
        self.lock_inner().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.options.max_batch_size()
    }

    /// Add an operation to the window.
    ///
    /// Flushes the window if this operation fills it. Fails with
    /// [`SyncError::WindowClosed`] once the window started flushing.
    pub fn push(self: &Arc<Self>, operation: BulkOperation) -> Result<CompletionHandle> {
        self.try_push(operation)
            .map_err(|_| SyncError::WindowClosed { window_id: self.id })
    }

    /// Like [`BatchWindow::push`], but gives the operation back if the window is closed.
    pub(crate) fn try_push(
        self: &Arc<Self>,
        operation: BulkOperation,
    ) -> std::result::Result<CompletionHandle, BulkOperation> {
        let (handle, arm_alarm, transition) = {
            let mut inner = self.lock_inner();

            if inner.state != WindowState::Open {
                return Err(operation);
            }

            let (entry, handle) = PendingEntry::new(operation);
            inner.entries.push(entry);
            inner.len += 1;

            let arm_alarm = inner.arm_alarm.take();
            let transition = if inner.len >= self.options.max_batch_size() {
                Some(inner.transition(FlushTrigger::Full))
            } else {
                None
            };

            (handle, arm_alarm, transition)
        };

        if let Some(arm_alarm) = arm_alarm {
            // The timer is gone only if the runtime is shutting down.
            let _ = arm_alarm.send(Arc::clone(self));
        }

        if let Some(transition) = transition {
            self.apply(FlushTrigger::Full, transition);
        }

        Ok(handle)
    }

    /// Flush the window now, regardless of its size and age.
    ///
    /// Calling this more than once, or on a window that is already flushing,
    /// does not send another request. An empty window is closed without
    /// sending anything.
    pub fn flush(self: &Arc<Self>) -> FlushHandle {
        self.begin_flush(FlushTrigger::Forced);
        self.completion()
    }

    /// Returns a handle that resolves once the window is done, without
    /// triggering a flush.
    pub fn completion(&self) -> FlushHandle {
        FlushHandle {
            window_id: self.id,
            rx: self.outcome.subscribe(),
        }
    }

    /// Returns `false` if the flush was skipped and the alarm must be rescheduled.
    fn begin_flush(self: &Arc<Self>, trigger: FlushTrigger) -> bool {
        let transition = self.lock_inner().transition(trigger);
        self.apply(trigger, transition)
    }

    fn apply(self: &Arc<Self>, trigger: FlushTrigger, transition: Transition) -> bool {
        match transition {
            Transition::Reschedule => false,
            Transition::AlreadyStarted => true,
            Transition::Empty => {
                debug!(window_id = self.id, %trigger, "closing empty window");
                let report = WindowReport::empty(self.id, trigger);
                self.outcome.send_replace(Some(Ok(report)));
                true
            }
            Transition::Flush(entries) => {
                debug!(
                    window_id = self.id,
                    operations = entries.len(),
                    %trigger,
                    "flushing window"
                );
                let window = Arc::clone(self);
                tokio::spawn(async move { window.execute(trigger, entries).await });
                true
            }
        }
    }

    fn schedule_alarm(self: &Arc<Self>, mut armed: oneshot::Receiver<Arc<BatchWindow>>) {
        let weak = Arc::downgrade(self);
        let max_age = self.options.max_batch_age();

        tokio::spawn(async move {
            let mut deadline = Instant::now() + max_age;

            let window = loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        // Nobody can push into a dropped window.
                        let Some(window) = weak.upgrade() else {
                            return;
                        };

                        if window.begin_flush(FlushTrigger::Timer) {
                            return;
                        }

                        deadline += max_age;
                    }
                    armed_window = &mut armed => match armed_window {
                        Ok(window) => break window,
                        // Dropped before anything was pushed.
                        Err(_) => return,
                    },
                }
            };

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    window.begin_flush(FlushTrigger::Timer);
                }
                _ = window.completion().wait() => {}
            }
        });
    }

    async fn execute(self: Arc<Self>, trigger: FlushTrigger, entries: Vec<PendingEntry>) {
        let started = Instant::now();
        let num_operations = entries.len();

        let (operations, replies): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .map(|entry| (entry.operation, entry.reply))
            .unzip();

        let attributes = [KeyValue::new("trigger", trigger.as_str())];
        self.metrics.flushes.add(1, &attributes);
        self.metrics
            .submitted_operations
            .add(num_operations as u64, &attributes);
        self.metrics
            .flush_size
            .record(num_operations as u64, &attributes);

        let outcome = match self.submit(BulkRequest::from_operations(operations)).await {
            Ok(response) => Ok(self.demultiplex(trigger, response.items, replies, started)),
            Err(error) => {
                warn!(
                    window_id = self.id,
                    operations = num_operations,
                    %error,
                    "bulk request failed"
                );
                self.metrics
                    .failed_operations
                    .add(num_operations as u64, &attributes);
                ReplyFanout::new(error.clone(), replies).send_to_all();
                Err(error)
            }
        };

        self.lock_inner().state = WindowState::Done;
        self.outcome.send_replace(Some(outcome));
    }

    /// Send the request and, if it was accepted, make its writes visible.
    async fn submit(&self, request: BulkRequest) -> Result<BulkResponse> {
        let response = self
            .client
            .bulk(request)
            .await
            .map_err(|source| SyncError::Transport {
                message: "bulk request failed",
                source: Arc::new(source),
            })?;

        // The transport can succeed while the endpoint rejects the whole batch.
        if !response.is_success() {
            return BatchSnafu {
                status: response.status,
                reason: response.reason(),
            }
            .fail();
        }

        self.client
            .refresh()
            .await
            .map_err(|source| SyncError::Refresh {
                source: Arc::new(source),
            })?;

        Ok(response)
    }

    /// Resolve each reply with the response item at the same position.
    fn demultiplex(
        &self,
        trigger: FlushTrigger,
        items: Vec<BulkResponseItem>,
        replies: Vec<ItemReplySender>,
        started: Instant,
    ) -> WindowReport {
        let mut report = WindowReport::empty(self.id, trigger);
        report.operations = replies.len();

        let mut items = items.into_iter();

        for (position, reply) in replies.into_iter().enumerate() {
            let result = match items.next().and_then(BulkResponseItem::into_result) {
                Some(item) if item.is_success() => {
                    report.succeeded += 1;
                    Ok(item)
                }
                Some(item) => {
                    report.failed += 1;
                    Err(SyncError::Item {
                        position,
                        status: item.status,
                        reason: item.reason(),
                        item,
                    })
                }
                None => {
                    report.unacknowledged += 1;
                    Err(SyncError::Unacknowledged {
                        window_id: self.id,
                        position,
                    })
                }
            };

            let _ = reply.send(result);
        }

        report.took = started.elapsed();

        let rejected = report.failed + report.unacknowledged;
        if rejected > 0 {
            self.metrics.failed_operations.add(
                rejected as u64,
                &[KeyValue::new("trigger", trigger.as_str())],
            );
            warn!(
                window_id = self.id,
                failed = report.failed,
                unacknowledged = report.unacknowledged,
                "bulk request partially rejected"
            );
        }

        info!(
            window_id = self.id,
            operations = report.operations,
            succeeded = report.succeeded,
            took_ms = report.took.as_millis() as u64,
            "window flushed"
        );

        report
    }

    fn lock_inner(&self) -> MutexGuard<'_, WindowInner> {
        // The lock is never held across code that can panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WindowInner {
    fn transition(&mut self, trigger: FlushTrigger) -> Transition {
        if self.state != WindowState::Open {
            return Transition::AlreadyStarted;
        }

        if self.entries.is_empty() {
            // An idle window never sends an empty request.
            if trigger == FlushTrigger::Timer {
                return Transition::Reschedule;
            }

            self.state = WindowState::Done;
            return Transition::Empty;
        }

        self.state = WindowState::Flushing;
        Transition::Flush(std::mem::take(&mut self.entries))
    }
}

impl FlushHandle {
    pub fn window_id(&self) -> u64 {
        self.window_id
    }

    /// Returns the outcome if the window is already done.
    pub fn outcome(&self) -> Option<FlushOutcome> {
        self.rx.borrow().clone()
    }

    pub async fn wait(mut self) -> FlushOutcome {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| ReplyChannelClosedSnafu {}.fail())
    }
}

impl IntoFuture for FlushHandle {
    type Output = FlushOutcome;
    type IntoFuture = BoxFuture<'static, FlushOutcome>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl WindowReport {
    fn empty(window_id: u64, trigger: FlushTrigger) -> Self {
        Self {
            window_id,
            trigger,
            operations: 0,
            succeeded: 0,
            failed: 0,
            unacknowledged: 0,
            took: Duration::ZERO,
        }
    }
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Full => "full",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Forced => "forced",
        }
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Debug for BatchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock_inner();
        f.debug_struct("BatchWindow")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("len", &inner.len)
            .field("options", &self.options)
            .finish()
    }
}
