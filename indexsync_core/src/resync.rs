//! Full resynchronization of a record source into an index.
use std::sync::Arc;

use futures::StreamExt;
use indexsync_bulk::{BulkClient, BulkOperation};
use snafu::{ResultExt, Snafu};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    options::ResyncOptions,
    sequencer::{DrainReport, WindowSequencer},
    source::{BoxError, RecordSource},
    transform::{DocumentTransform, StripIdentity, reserved_field},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ResyncError {
    #[snafu(display("failed to read source record"))]
    Source { source: BoxError },
    #[snafu(display("failed to transform record {id}"))]
    Transform { id: String, source: BoxError },
    #[snafu(display("record {id} sets the reserved field {field}"))]
    ReservedField { id: String, field: &'static str },
}

/// Result of a resync that read its whole source.
#[derive(Debug, Clone, Default)]
pub struct ResyncSummary {
    /// Records read from the source and pushed.
    pub records: usize,
    pub report: DrainReport,
}

/// Copies every record of a source into the index through a window sequencer.
///
/// Reading pauses while `max_in_flight_windows` windows are flushing, so the
/// number of operations held in memory stays bounded whatever the source size.
pub struct ResyncDriver<T = StripIdentity> {
    client: Arc<dyn BulkClient>,
    options: ResyncOptions,
    transform: T,
}

impl ResyncDriver {
    pub fn new(client: Arc<dyn BulkClient>, options: ResyncOptions) -> Self {
        Self {
            client,
            options,
            transform: StripIdentity::default(),
        }
    }
}

impl<T: DocumentTransform> ResyncDriver<T> {
    pub fn with_transform<U: DocumentTransform>(self, transform: U) -> ResyncDriver<U> {
        ResyncDriver {
            client: self.client,
            options: self.options,
            transform,
        }
    }

    pub fn options(&self) -> &ResyncOptions {
        &self.options
    }

    /// Read every record from `source` and wait until all of them were flushed.
    ///
    /// A source or transform error aborts the resync. Windows already flushed
    /// are not rolled back, the window being filled is flushed anyway.
    pub async fn run(&self, source: &dyn RecordSource) -> Result<ResyncSummary, ResyncError> {
        let started = Instant::now();
        let sequencer = WindowSequencer::new(self.client.clone(), self.options.batch);
        let mut records = source.records();
        let mut num_records = 0;

        info!(index = %self.options.index, "starting resync");

        while let Some(record) = records.next().await {
            let record = record.context(SourceSnafu)?;

            let body = self
                .transform
                .transform(&record)
                .await
                .context(TransformSnafu {
                    id: record.id.clone(),
                })?;

            if let Some(field) = reserved_field(&body) {
                warn!(id = %record.id, field, "aborting resync");
                return ReservedFieldSnafu {
                    id: record.id,
                    field,
                }
                .fail();
            }

            sequencer
                .wait_for_capacity(self.options.max_in_flight_windows)
                .await;

            // Outcomes are collected from the drain report.
            let _ = sequencer.push(BulkOperation::index(&self.options.index, record.id, body));
            num_records += 1;
        }

        if sequencer.is_empty() {
            debug!(index = %self.options.index, "source is empty");
            return Ok(ResyncSummary::default());
        }

        let _ = sequencer.force_flush_current();
        let report = sequencer.drain().await;

        info!(
            index = %self.options.index,
            records = num_records,
            windows = report.window_count(),
            succeeded = report.succeeded_operations(),
            success = report.is_success(),
            took_ms = started.elapsed().as_millis() as u64,
            "resync finished"
        );

        Ok(ResyncSummary {
            records: num_records,
            report,
        })
    }
}

impl ResyncSummary {
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        source::{MemorySource, SourceRecord},
        test_utils::{ScriptedBulkClient, batch_options, document},
        transform::FnTransform,
    };

    fn people(count: usize) -> MemorySource {
        (0..count)
            .map(|i| SourceRecord::new(i.to_string(), document(&i.to_string(), "someone")))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_pushes_every_record() {
        let client = Arc::new(ScriptedBulkClient::default());
        let options = ResyncOptions::new("people").with_batch(batch_options(4));
        let driver = ResyncDriver::new(client.clone(), options);

        let summary = driver.run(&people(10)).await.unwrap();

        assert_eq!(summary.records, 10);
        assert!(summary.is_success());
        assert_eq!(summary.report.windows.len(), 3);

        let sizes = client
            .requests()
            .iter()
            .map(|r| r.len())
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_strips_identity_from_body() {
        let client = Arc::new(ScriptedBulkClient::default());
        let driver = ResyncDriver::new(client.clone(), ResyncOptions::new("people"));

        driver.run(&people(1)).await.unwrap();

        let fragments = client.requests()[0].fragments().to_vec();
        assert_eq!(fragments[0], json!({ "index": { "_index": "people", "_id": "0" } }));
        assert_eq!(fragments[1], json!({ "name": "someone" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_forces_last_window() {
        let client = Arc::new(ScriptedBulkClient::default());
        let options = ResyncOptions::new("people").with_batch(batch_options(100));
        let driver = ResyncDriver::new(client.clone(), options);
        let start = Instant::now();

        driver.run(&people(3)).await.unwrap();

        // No need to wait for the age timer.
        assert!(start.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserved_field_aborts() {
        let client = Arc::new(ScriptedBulkClient::default());
        let driver = ResyncDriver::new(client.clone(), ResyncOptions::new("people"))
            .with_transform(FnTransform::new(|record: &SourceRecord| Ok(record.document.clone())));

        let err = driver.run(&people(2)).await.unwrap_err();

        assert!(matches!(
            err,
            ResyncError::ReservedField { ref id, field: "_id" } if id == "0"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backpressure_bounds_in_flight_windows() {
        let client = Arc::new(ScriptedBulkClient::gated());
        let options = ResyncOptions::new("people").with_batch(batch_options(2));
        let driver = ResyncDriver::new(client.clone(), options);

        let run = tokio::spawn({
            let source = people(10);
            async move { driver.run(&source).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        // The first window is flushing, the driver waits before opening another.
        assert!(!run.is_finished());
        assert!(client.requests().is_empty());

        client.open_gate();
        let summary = run.await.unwrap().unwrap();

        assert_eq!(summary.records, 10);
        assert_eq!(client.requests().len(), 5);
    }
}
