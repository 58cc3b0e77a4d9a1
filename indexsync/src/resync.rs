use std::path::PathBuf;

use clap::Parser;
use indexsync_core::{
    JsonLinesSource, RESERVED_IDENTITY_FIELD, ResyncDriver, ResyncOptions, StripIdentity,
};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::{
    batch::BatchArgs,
    error::{CliError, Result, ResyncSnafu},
    remote::RemoteArgs,
};

/// Copy every record of an NDJSON file into the index
#[derive(Parser)]
pub struct ResyncArgs {
    /// NDJSON file with one record per line
    source: PathBuf,
    /// Field holding the identity of each record
    #[arg(long, default_value = RESERVED_IDENTITY_FIELD)]
    id_field: String,
    #[clap(flatten)]
    batch: BatchArgs,
    #[clap(flatten)]
    remote: RemoteArgs,
}

impl ResyncArgs {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        let options = ResyncOptions::new(&self.remote.index)
            .with_batch(self.batch.batch_options()?)
            .with_max_in_flight_windows(self.batch.max_in_flight_windows);

        let source = JsonLinesSource::new(&self.source).with_id_field(&self.id_field);
        let driver = ResyncDriver::new(self.remote.bulk_client(), options)
            .with_transform(StripIdentity::new(&self.id_field));

        println!(
            "Resyncing {} into index {}",
            self.source.display(),
            self.remote.index
        );

        let summary = tokio::select! {
            _ = ct.cancelled() => return Err(CliError::Cancelled),
            summary = driver.run(&source) => summary.context(ResyncSnafu {})?,
        };

        for window in &summary.report.windows {
            match &window.outcome {
                Ok(report) => println!(
                    "Window {}: {} operations, {} succeeded, {} failed ({})",
                    window.window_id,
                    report.operations,
                    report.succeeded,
                    report.failed + report.unacknowledged,
                    report.trigger,
                ),
                Err(err) => println!("Window {}: rejected: {}", window.window_id, err),
            }
        }

        let evicted = summary.report.evicted;
        if evicted.windows > 0 {
            println!(
                "{} earlier windows ({} rejected): {} operations, {} succeeded, {} failed",
                evicted.windows,
                evicted.failed_windows,
                evicted.operations,
                evicted.succeeded,
                evicted.rejected,
            );
        }

        let succeeded = summary.report.succeeded_operations();
        println!("Indexed {} of {} records", succeeded, summary.records);

        if !summary.is_success() {
            return Err(CliError::Incomplete {
                failed: summary.records - succeeded,
                total: summary.records,
            });
        }

        Ok(())
    }
}
