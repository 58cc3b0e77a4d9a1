use std::sync::Arc;

use clap::Args;
use indexsync_bulk::{BulkClient, HttpBulkClient, MemoryBulkClient};
use tracing::info;

/// Arguments for configuring the search engine connection.
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// The base URL of the search engine
    #[arg(long, env = "INDEXSYNC_URL", default_value = "http://localhost:9200")]
    pub url: String,
    /// The index receiving the documents
    #[arg(long, env = "INDEXSYNC_INDEX")]
    pub index: String,
    /// Send the bulk requests to an in-memory index instead
    #[arg(long)]
    pub dry_run: bool,
}

impl RemoteArgs {
    pub fn bulk_client(&self) -> Arc<dyn BulkClient> {
        if self.dry_run {
            info!(index = %self.index, "using in-memory index");
            return Arc::new(MemoryBulkClient::new(&self.index));
        }

        Arc::new(HttpBulkClient::new(&self.url, &self.index))
    }
}
