use std::path::PathBuf;

use clap::Parser;
use futures::{StreamExt, stream::FuturesOrdered};
use indexsync_core::{CompletionHandle, Indexer};
use serde::Deserialize;
use serde_json::Value;
use snafu::ResultExt;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::{
    batch::BatchArgs,
    error::{CliError, InvalidCommandSnafu, IoSnafu, Result},
    remote::RemoteArgs,
};

/// Apply index and delete commands to the index
#[derive(Parser)]
pub struct PushArgs {
    /// NDJSON file of commands, or - for stdin
    ///
    /// Each line is either {"op": "index", "id": ..., "doc": {...}}
    /// or {"op": "delete", "id": ...}.
    commands: PathBuf,
    #[clap(flatten)]
    batch: BatchArgs,
    #[clap(flatten)]
    remote: RemoteArgs,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
enum PushCommand {
    Index { id: String, doc: Value },
    Delete { id: String },
}

impl PushArgs {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        let content = if self.commands.as_os_str() == "-" {
            let mut content = String::new();
            tokio::io::stdin()
                .read_to_string(&mut content)
                .await
                .context(IoSnafu {})?;
            content
        } else {
            tokio::fs::read_to_string(&self.commands)
                .await
                .context(IoSnafu {})?
        };

        let commands = parse_commands(&content)?;
        if commands.is_empty() {
            return Err(CliError::InvalidArgument {
                name: "commands",
                message: "No command to push".to_string(),
            });
        }

        let indexer = Indexer::new(
            self.remote.bulk_client(),
            &self.remote.index,
            self.batch.batch_options()?,
        );

        let mut responses = FuturesOrdered::new();
        for command in commands {
            let (description, handle): (String, CompletionHandle) = match command {
                PushCommand::Index { id, doc } => (format!("index {id}"), indexer.index(id, doc)),
                PushCommand::Delete { id } => (format!("delete {id}"), indexer.delete(id)),
            };
            responses.push_back(async move { (description, handle.await) });
        }

        // Nothing else will be pushed.
        let _ = indexer.flush();

        let total = responses.len();
        let mut failed = 0;

        loop {
            let response = tokio::select! {
                _ = ct.cancelled() => return Err(CliError::Cancelled),
                response = responses.next() => response,
            };

            let Some((description, result)) = response else {
                break;
            };

            match result {
                Ok(item) => println!(
                    "Accepted: {} (status={}, result={})",
                    description,
                    item.status,
                    item.result.as_deref().unwrap_or("-")
                ),
                Err(err) => {
                    failed += 1;
                    println!("Rejected: {}: {}", description, err);
                }
            }
        }

        if failed > 0 {
            return Err(CliError::Incomplete { failed, total });
        }

        Ok(())
    }
}

fn parse_commands(content: &str) -> Result<Vec<PushCommand>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| serde_json::from_str(line).context(InvalidCommandSnafu { line: i + 1 }))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_commands() {
        let content = r#"
{"op": "index", "id": "1", "doc": {"name": "Ada"}}

{"op": "delete", "id": "2"}
"#;

        let commands = parse_commands(content).unwrap();

        assert_eq!(
            commands,
            vec![
                PushCommand::Index {
                    id: "1".to_string(),
                    doc: json!({ "name": "Ada" }),
                },
                PushCommand::Delete {
                    id: "2".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_commands_reports_line() {
        let content = "{\"op\": \"delete\", \"id\": \"1\"}\n{\"op\": \"upsert\"}\n";

        let err = parse_commands(content).unwrap_err();

        assert!(matches!(err, CliError::InvalidCommand { line: 2, .. }));
    }
}
