use std::time::Duration;

use crate::error::{InvalidOptionsSnafu, Result};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;
pub const DEFAULT_MAX_BATCH_AGE: Duration = Duration::from_millis(1500);
pub const DEFAULT_MAX_IN_FLIGHT_WINDOWS: usize = 1;

/// Limits of a single batch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    max_batch_size: usize,
    max_batch_age: Duration,
}

/// Options for a full resynchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncOptions {
    /// The index receiving the documents.
    pub index: String,
    /// Limits of each batch window.
    pub batch: BatchOptions,
    /// Pause reading records while this many windows are flushing.
    pub max_in_flight_windows: usize,
}

impl BatchOptions {
    /// Flush after `max_batch_size` operations or `max_batch_age`, whichever comes first.
    pub fn new(max_batch_size: usize, max_batch_age: Duration) -> Result<Self> {
        if max_batch_size == 0 {
            return InvalidOptionsSnafu {
                message: "max_batch_size must be positive",
            }
            .fail();
        }

        if max_batch_age.is_zero() {
            return InvalidOptionsSnafu {
                message: "max_batch_age must be positive",
            }
            .fail();
        }

        Ok(Self {
            max_batch_size,
            max_batch_age,
        })
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn max_batch_age(&self) -> Duration {
        self.max_batch_age
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_age: DEFAULT_MAX_BATCH_AGE,
        }
    }
}

impl ResyncOptions {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            batch: BatchOptions::default(),
            max_in_flight_windows: DEFAULT_MAX_IN_FLIGHT_WINDOWS,
        }
    }

    pub fn with_batch(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }

    /// Values below one are treated as one.
    pub fn with_max_in_flight_windows(mut self, max_in_flight_windows: usize) -> Self {
        self.max_in_flight_windows = max_in_flight_windows.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncError;

    #[test]
    fn test_defaults() {
        let options = BatchOptions::default();
        assert_eq!(options.max_batch_size(), 1000);
        assert_eq!(options.max_batch_age(), Duration::from_millis(1500));

        let resync = ResyncOptions::new("people");
        assert_eq!(resync.index, "people");
        assert_eq!(resync.max_in_flight_windows, 1);
    }

    #[test]
    fn test_rejects_empty_limits() {
        let err = BatchOptions::new(0, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SyncError::InvalidOptions { .. }));

        let err = BatchOptions::new(10, Duration::ZERO).unwrap_err();
        assert!(matches!(err, SyncError::InvalidOptions { .. }));
    }

    #[test]
    fn test_in_flight_windows_at_least_one() {
        let resync = ResyncOptions::new("people").with_max_in_flight_windows(0);
        assert_eq!(resync.max_in_flight_windows, 1);
    }
}
