use std::time::Duration;

use clap::Args;
use indexsync_core::{
    BatchOptions,
    options::{DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_IN_FLIGHT_WINDOWS},
};
use snafu::ResultExt;

use crate::error::{BatchOptionsSnafu, Result};

/// Arguments controlling how operations are coalesced.
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Flush a window once it holds this many operations
    #[arg(long, default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,
    /// Flush a window this many milliseconds after it was opened
    #[arg(long, default_value_t = 1500)]
    pub max_batch_age_ms: u64,
    /// Stop reading input while this many windows are flushing
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT_WINDOWS)]
    pub max_in_flight_windows: usize,
}

impl BatchArgs {
    pub fn batch_options(&self) -> Result<BatchOptions> {
        BatchOptions::new(
            self.max_batch_size,
            Duration::from_millis(self.max_batch_age_ms),
        )
        .context(BatchOptionsSnafu {})
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[clap(flatten)]
        batch: BatchArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["test"]);
        let options = cli.batch.batch_options().unwrap();

        assert_eq!(options, BatchOptions::default());
        assert_eq!(cli.batch.max_in_flight_windows, 1);
    }

    #[test]
    fn test_rejects_zero_size() {
        let cli = TestCli::parse_from(["test", "--max-batch-size", "0"]);
        assert!(cli.batch.batch_options().is_err());
    }
}
