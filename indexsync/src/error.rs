use indexsync_bulk::BulkClientError;
use indexsync_core::{ResyncError, SyncError};
use indexsync_observability::ObservabilityError;
use snafu::Snafu;

/// CLI error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("Invalid {name} argument: {message}"))]
    InvalidArgument { name: &'static str, message: String },
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },
    #[snafu(display("Invalid command at line {line}"))]
    InvalidCommand {
        line: usize,
        source: serde_json::Error,
    },
    #[snafu(display("Invalid batch options"))]
    BatchOptions { source: SyncError },
    #[snafu(display("Resync failed"))]
    Resync { source: ResyncError },
    #[snafu(display("Failed bulk client operation {operation}"))]
    BulkClient {
        operation: &'static str,
        source: BulkClientError,
    },
    #[snafu(display("Failed to initialize observability"))]
    Observability { source: ObservabilityError },
    #[snafu(display("Cancelled"))]
    Cancelled,
    #[snafu(display("{failed} of {total} operations failed"))]
    Incomplete { failed: usize, total: usize },
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;
