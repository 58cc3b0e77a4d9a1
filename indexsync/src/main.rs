use clap::{Parser, Subcommand};
use indexsync_observability::init_observability;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::{
    count::CountArgs,
    error::{ObservabilitySnafu, Result},
    push::PushArgs,
    resync::ResyncArgs,
};

mod batch;
mod count;
mod error;
mod push;
mod remote;
mod resync;

#[derive(Parser)]
#[command(name = "indexsync")]
#[command(about = "Mirror documents into a search index with batched bulk requests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every record of an NDJSON file into the index
    Resync {
        #[clap(flatten)]
        inner: ResyncArgs,
    },
    /// Apply index and delete commands to the index
    Push {
        #[clap(flatten)]
        inner: PushArgs,
    },
    /// Count the documents visible in the index
    Count {
        #[clap(flatten)]
        inner: CountArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_observability(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .context(ObservabilitySnafu {})?;

    let ct = CancellationToken::new();

    let ct_clone = ct.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ct_clone.cancel();
    });

    match cli.command {
        Commands::Resync { inner } => inner.run(ct).await,
        Commands::Push { inner } => inner.run(ct).await,
        Commands::Count { inner } => inner.run(ct).await,
    }
}
