use snafu::Snafu;

/// Errors raised while talking to the bulk endpoint.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BulkClientError {
    #[snafu(display("Request error"))]
    Request { source: reqwest::Error },
    #[snafu(display("Failed to encode {what}"))]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("Failed to decode {what}"))]
    Decode {
        what: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("Response error: status={status}, message={message}"))]
    Status { status: u16, message: String },
    #[snafu(display("Bulk endpoint unavailable: {message}"))]
    Unavailable { message: String },
}

pub type Result<T, E = BulkClientError> = std::result::Result<T, E>;
