use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::future::join_all;
use indexsync_bulk::{BulkClient, BulkOperation};
use tracing::debug;

use crate::{
    error::SyncError,
    handle::CompletionHandle,
    metrics::SyncMetrics,
    options::BatchOptions,
    window::{BatchWindow, FlushHandle, FlushOutcome, WindowState},
};

/// Outcomes kept for `drain` before the oldest are folded into totals.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Routes operations to a chain of batch windows.
///
/// Once a window starts flushing it is immutable, so the next push opens a
/// new window instead of waiting for the in-flight request. Dropping the
/// sequencer flushes the current window.
///
/// Finished windows are remembered until the next [`WindowSequencer::drain`].
/// Past the history limit only their totals are kept, so a sequencer that is
/// never drained uses bounded memory.
pub struct WindowSequencer {
    client: Arc<dyn BulkClient>,
    options: BatchOptions,
    history_limit: usize,
    metrics: Arc<SyncMetrics>,
    state: Mutex<SequencerState>,
}

#[derive(Default)]
struct SequencerState {
    /// The window receiving new operations.
    current: Option<Arc<BatchWindow>>,
    /// Windows not reported by `drain` yet, in creation order.
    pending: VecDeque<Arc<BatchWindow>>,
    /// Outcomes of windows that were done and pruned from `pending`.
    completed: VecDeque<WindowOutcome>,
    /// Totals of outcomes dropped from `completed`.
    evicted: EvictedOutcomes,
    windows_created: u64,
}

/// The outcome of one window, as reported by [`WindowSequencer::drain`].
#[derive(Debug, Clone)]
pub struct WindowOutcome {
    pub window_id: u64,
    pub outcome: FlushOutcome,
}

/// Outcomes of every window drained, in creation order.
///
/// A failed window does not hide the successes of the others.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    pub windows: Vec<WindowOutcome>,
    /// Windows that finished too long before the drain to be listed.
    pub evicted: EvictedOutcomes,
}

/// Totals of window outcomes that no longer fit in the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictedOutcomes {
    pub windows: usize,
    /// Windows whose bulk request failed as a whole.
    pub failed_windows: usize,
    /// Operations sent in windows whose request was accepted.
    pub operations: usize,
    pub succeeded: usize,
    /// Operations rejected by their item or left unacknowledged.
    pub rejected: usize,
}

impl WindowSequencer {
    pub fn new(client: Arc<dyn BulkClient>, options: BatchOptions) -> Self {
        Self {
            client,
            options,
            history_limit: DEFAULT_HISTORY_LIMIT,
            metrics: Default::default(),
            state: Mutex::new(SequencerState::default()),
        }
    }

    /// Keep at most `limit` window outcomes between two drains.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Push an operation into the current window, opening one if needed.
    ///
    /// Never blocks. Must be called from within a Tokio runtime.
    pub fn push(&self, mut operation: BulkOperation) -> CompletionHandle {
        let mut state = self.lock_state();

        loop {
            let window = match &state.current {
                Some(window) if window.is_open() => window.clone(),
                _ => self.open_window(&mut state),
            };

            match window.try_push(operation) {
                Ok(handle) => return handle,
                // The timer closed the window between the check and the push.
                Err(rejected) => operation = rejected,
            }
        }
    }

    /// Flush the current window, if any, regardless of its size and age.
    pub fn force_flush_current(&self) -> Option<FlushHandle> {
        let current = self.lock_state().current.clone();
        current.map(|window| window.flush())
    }

    /// Returns true if no operation was ever pushed.
    pub fn is_empty(&self) -> bool {
        let state = self.lock_state();
        match (state.windows_created, &state.current) {
            (0, _) => true,
            (1, Some(window)) => window.is_empty(),
            _ => false,
        }
    }

    /// Number of windows opened so far.
    pub fn windows_created(&self) -> u64 {
        self.lock_state().windows_created
    }

    /// Number of finished windows listed by the next drain.
    pub fn retained_outcomes(&self) -> usize {
        self.lock_state().completed.len()
    }

    /// Number of windows whose bulk request is in flight.
    pub fn windows_in_flight(&self) -> usize {
        self.lock_state()
            .pending
            .iter()
            .filter(|window| window.state() == WindowState::Flushing)
            .count()
    }

    /// Wait until fewer than `max_in_flight` windows are flushing.
    pub async fn wait_for_capacity(&self, max_in_flight: usize) {
        let max_in_flight = max_in_flight.max(1);

        loop {
            let oldest = {
                let state = self.lock_state();
                let mut flushing = state
                    .pending
                    .iter()
                    .filter(|window| window.state() == WindowState::Flushing);

                let Some(oldest) = flushing.next().cloned() else {
                    return;
                };

                if 1 + flushing.count() < max_in_flight {
                    return;
                }

                oldest
            };

            debug!(window_id = oldest.id(), "waiting for window to flush");
            // Failures are reported by `drain`.
            let _ = oldest.completion().wait().await;
        }
    }

    /// Wait until every window opened so far is done.
    ///
    /// The current window is not forced, it flushes when full or expired.
    /// Windows opened while draining are waited for too.
    pub async fn drain(&self) -> DrainReport {
        let mut outcomes = BTreeMap::new();
        let mut evicted = EvictedOutcomes::default();

        loop {
            let (completed, pending) = {
                let mut state = self.lock_state();
                let completed = std::mem::take(&mut state.completed);
                evicted.merge(std::mem::take(&mut state.evicted));
                let pending = state.pending.iter().cloned().collect::<Vec<_>>();
                (completed, pending)
            };

            for completed in completed {
                outcomes.insert(completed.window_id, completed.outcome);
            }

            if pending.is_empty() {
                break;
            }

            let waits = pending.iter().map(|window| window.completion().wait());
            let results = join_all(waits).await;

            self.lock_state()
                .pending
                .retain(|window| !pending.iter().any(|p| p.id() == window.id()));

            for (window, outcome) in pending.iter().zip(results) {
                outcomes.insert(window.id(), outcome);
            }
        }

        let windows = outcomes
            .into_iter()
            .map(|(window_id, outcome)| WindowOutcome { window_id, outcome })
            .collect();

        DrainReport { windows, evicted }
    }

    fn open_window(&self, state: &mut SequencerState) -> Arc<BatchWindow> {
        state.prune_completed(self.history_limit);

        let window_id = state.windows_created;
        state.windows_created += 1;

        let window = BatchWindow::open_with_metrics(
            window_id,
            self.client.clone(),
            self.options,
            self.metrics.clone(),
        );

        self.metrics.windows_created.add(1, &[]);
        debug!(window_id, "opened window");

        state.current = Some(window.clone());
        state.pending.push_back(window.clone());
        window
    }

    fn lock_state(&self) -> MutexGuard<'_, SequencerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WindowSequencer {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);

        let Some(window) = state.current.take() else {
            return;
        };

        // Flushing needs a runtime to spawn the request on.
        if !window.is_empty() && tokio::runtime::Handle::try_current().is_ok() {
            let _ = window.flush();
        }
    }
}

impl SequencerState {
    /// Move the outcomes of finished windows out of `pending`.
    fn prune_completed(&mut self, history_limit: usize) {
        while let Some(window) = self.pending.front() {
            let Some(outcome) = window.completion().outcome() else {
                break;
            };

            self.completed.push_back(WindowOutcome {
                window_id: window.id(),
                outcome,
            });
            self.pending.pop_front();
        }

        while self.completed.len() > history_limit {
            let Some(oldest) = self.completed.pop_front() else {
                break;
            };
            debug!(window_id = oldest.window_id, "evicting window outcome");
            self.evicted.record(&oldest);
        }
    }
}

impl EvictedOutcomes {
    fn record(&mut self, window: &WindowOutcome) {
        self.windows += 1;

        match &window.outcome {
            Ok(report) => {
                self.operations += report.operations;
                self.succeeded += report.succeeded;
                self.rejected += report.failed + report.unacknowledged;
            }
            Err(_) => self.failed_windows += 1,
        }
    }

    fn merge(&mut self, other: EvictedOutcomes) {
        self.windows += other.windows;
        self.failed_windows += other.failed_windows;
        self.operations += other.operations;
        self.succeeded += other.succeeded;
        self.rejected += other.rejected;
    }

    pub fn is_success(&self) -> bool {
        self.failed_windows == 0 && self.rejected == 0
    }
}

impl DrainReport {
    /// Returns true if every window flushed and every operation succeeded.
    pub fn is_success(&self) -> bool {
        self.evicted.is_success()
            && self.windows.iter().all(|window| match &window.outcome {
                Ok(report) => report.failed == 0 && report.unacknowledged == 0,
                Err(_) => false,
            })
    }

    /// Number of windows drained, evicted ones included.
    pub fn window_count(&self) -> usize {
        self.windows.len() + self.evicted.windows
    }

    /// Listed windows whose bulk request failed as a whole.
    pub fn failed(&self) -> impl Iterator<Item = (u64, &SyncError)> {
        self.windows
            .iter()
            .filter_map(|window| match &window.outcome {
                Ok(_) => None,
                Err(err) => Some((window.window_id, err)),
            })
    }

    /// Listed windows whose bulk request was accepted.
    pub fn succeeded(&self) -> impl Iterator<Item = &WindowOutcome> {
        self.windows.iter().filter(|window| window.outcome.is_ok())
    }

    /// Operations acknowledged as successful.
    pub fn succeeded_operations(&self) -> usize {
        self.evicted.succeeded
            + self
                .windows
                .iter()
                .filter_map(|window| window.outcome.as_ref().ok())
                .map(|report| report.succeeded)
                .sum::<usize>()
    }

    /// Operations sent in windows whose request was accepted.
    pub fn operations(&self) -> usize {
        self.evicted.operations
            + self
                .windows
                .iter()
                .filter_map(|window| window.outcome.as_ref().ok())
                .map(|report| report.operations)
                .sum::<usize>()
    }
}
