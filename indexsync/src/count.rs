use clap::Parser;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{BulkClientSnafu, CliError, Result},
    remote::RemoteArgs,
};

/// Count the documents visible in the index
#[derive(Parser)]
pub struct CountArgs {
    #[clap(flatten)]
    remote: RemoteArgs,
}

impl CountArgs {
    pub async fn run(self, _ct: CancellationToken) -> Result<()> {
        // The in-memory index starts empty on every run.
        if self.remote.dry_run {
            return Err(CliError::InvalidArgument {
                name: "dry-run",
                message: "count reads the remote index and has no dry run".to_string(),
            });
        }

        let client = self.remote.bulk_client();

        let count = client
            .count()
            .await
            .context(BulkClientSnafu { operation: "count" })?;

        println!("{count}");
        Ok(())
    }
}
