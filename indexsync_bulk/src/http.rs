//! HTTP client for Elasticsearch-compatible bulk endpoints.

use async_trait::async_trait;
use bytesize::ByteSize;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    BulkClient, BulkRequest, BulkResponse,
    error::{BulkClientError, DecodeSnafu, RequestSnafu, Result},
};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// A bulk client bound to a single index of a remote search engine.
#[derive(Debug, Clone)]
pub struct HttpBulkClient {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl HttpBulkClient {
    /// Create a new client for `index` on the server at `base_url`.
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, index)
    }

    /// Create a new client reusing an existing connection pool.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            index: index.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.index, endpoint)
    }
}

#[async_trait]
impl BulkClient for HttpBulkClient {
    async fn bulk(&self, request: BulkRequest) -> Result<BulkResponse> {
        let body = request.to_ndjson()?;

        debug!(
            index = %self.index,
            operations = request.len(),
            size = %ByteSize(body.len() as u64),
            "sending bulk request"
        );

        let response = self
            .client
            .post(self.url("_bulk"))
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .context(RequestSnafu {})?;

        let status = response.status();
        let bytes = response.bytes().await.context(RequestSnafu {})?;

        let mut bulk_response = match serde_json::from_slice::<BulkResponse>(&bytes) {
            Ok(decoded) => decoded,
            // Proxies and load balancers answer errors with arbitrary bodies.
            Err(_) if !status.is_success() => BulkResponse {
                error: Some(Value::String(String::from_utf8_lossy(&bytes).into_owned())),
                ..Default::default()
            },
            Err(err) => {
                return Err(err).context(DecodeSnafu {
                    what: "bulk response",
                });
            }
        };

        bulk_response.status = status.as_u16();

        Ok(bulk_response)
    }

    async fn refresh(&self) -> Result<()> {
        let response = self
            .client
            .post(self.url("_refresh"))
            .send()
            .await
            .context(RequestSnafu {})?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        Err(status_error(status, response).await)
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .get(self.url("_count"))
            .send()
            .await
            .context(RequestSnafu {})?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let bytes = response.bytes().await.context(RequestSnafu {})?;
        let count = serde_json::from_slice::<CountResponse>(&bytes).context(DecodeSnafu {
            what: "count response",
        })?;

        Ok(count.count)
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> BulkClientError {
    let message = match response.text().await {
        Ok(text) => text,
        Err(err) => err.to_string(),
    };

    BulkClientError::Status {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_strips_trailing_slash() {
        let client = HttpBulkClient::new("http://localhost:9200/", "people");
        assert_eq!(client.url("_bulk"), "http://localhost:9200/people/_bulk");
        assert_eq!(client.index(), "people");
    }
}
