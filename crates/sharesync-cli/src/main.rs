//! sharesync CLI: create, sync, read and remove shares from the command line.
//!
//! Storage is taken from `--storage <uri>` or, when absent, from the
//! `SHARESYNC_STORAGE_*` environment variables. Results are printed to stdout
//! as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sharesync_core::config::{ShareConfig, StorageConfig};
use sharesync_core::{Data, ShareError, ShareId};
use sharesync_runtime::{ShareAuth, ShareNode};

/// sharesync - persist, compact and read shared session event streams
#[derive(Parser, Debug)]
#[command(name = "sharesync")]
#[command(version)]
pub struct Args {
    /// Storage URI (s3://bucket?region=..., r2://bucket?account=..., local://path, memory://)
    #[arg(long, global = true)]
    pub storage: Option<String>,

    /// Deadline for each storage request, in seconds
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Create non-production (`test_`) shares
    #[arg(long, global = true)]
    pub non_production: bool,

    /// Scheme and host prefixed to share links (https://share.example.com)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a share for a session and print its id, secret and link
    Create {
        /// Session to share
        session_id: String,
    },
    /// Print a share record
    Get { share_id: String },
    /// Append a JSON array of data items to a share as one event
    Sync {
        share_id: String,
        #[arg(long)]
        secret: String,
        /// File holding the JSON array (`-` for stdin)
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the compacted data of a share
    Data { share_id: String },
    /// Print the compacted data of a share grouped by session and message
    View { share_id: String },
    /// Delete a share with all of its events
    Remove {
        share_id: String,
        #[arg(long)]
        secret: String,
    },
}

impl Args {
    fn config(&self) -> sharesync_core::Result<ShareConfig> {
        let mut config = match &self.storage {
            Some(uri) => ShareConfig::new(StorageConfig::from_uri(uri)?),
            None => ShareConfig::from_env()?,
        };
        if let Some(secs) = self.timeout {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.non_production |= self.non_production;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let node = ShareNode::start(args.config()?).await?;
    let output = run(&node, args.command, args.base_url.as_deref()).await;
    node.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

async fn run(
    node: &ShareNode,
    command: Command,
    base_url: Option<&str>,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let shares = &node.shares;
    let value = match command {
        Command::Create { session_id } => {
            let record = shares.create(session_id).await?;
            serde_json::to_value(record.link(base_url))?
        }
        Command::Get { share_id } => {
            let id = ShareId::new(share_id);
            let record = shares
                .get(&id)
                .await?
                .ok_or(ShareError::NotFound { id })?;
            serde_json::to_value(record)?
        }
        Command::Sync {
            share_id,
            secret,
            file,
        } => {
            let items = read_items(&file).await?;
            debug!(items = items.len(), "Read data items");
            let event = shares
                .sync(&ShareAuth::new(share_id, secret), &items)
                .await?;
            serde_json::json!({ "event": event, "items": items.len() })
        }
        Command::Data { share_id } => {
            serde_json::to_value(shares.data(&ShareId::new(share_id)).await?)?
        }
        Command::View { share_id } => {
            serde_json::to_value(shares.view(&ShareId::new(share_id)).await?)?
        }
        Command::Remove { share_id, secret } => {
            let report = shares.remove(&ShareAuth::new(share_id, secret)).await?;
            let failed: Vec<String> = report
                .failed
                .iter()
                .map(|(key, e)| format!("{}: {e}", key.join("/")))
                .collect();
            serde_json::json!({ "removed": report.removed, "failed": failed })
        }
    };
    Ok(value)
}

async fn read_items(file: &Path) -> Result<Vec<Data>, Box<dyn std::error::Error>> {
    let raw = if file.as_os_str() == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        buf
    } else {
        tokio::fs::read(file).await?
    };
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_does_not_error() {
        let err = Args::try_parse_from(["sharesync", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_sync_requires_secret() {
        let result =
            Args::try_parse_from(["sharesync", "sync", "abc", "--file", "items.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_storage_flag_builds_config() {
        let args = Args::try_parse_from([
            "sharesync",
            "data",
            "abc",
            "--storage",
            "r2://shares?account=acct42",
            "--timeout",
            "5",
        ])
        .unwrap();
        let config = args.config().unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(matches!(config.storage, StorageConfig::R2 { .. }));
        assert!(matches!(args.command, Command::Data { ref share_id } if share_id == "abc"));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let result = Args::try_parse_from(["sharesync", "get", "abc", "--timeout", "0"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_against_memory_storage() {
        let config = ShareConfig::new(StorageConfig::Memory);
        let node = ShareNode::start(config).await.unwrap();

        let created = run(
            &node,
            Command::Create {
                session_id: "ses_cli_roundtrip".to_string(),
            },
            Some("https://share.example.com"),
        )
        .await
        .unwrap();
        let share_id = created["id"].as_str().unwrap().to_string();
        assert_eq!(share_id, "oundtrip");
        assert_eq!(created["url"], "https://share.example.com/share/oundtrip");
        assert!(created["secret"].is_string());

        let data = run(&node, Command::Data { share_id }, None).await.unwrap();
        assert_eq!(data, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_read_items_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("items.json");
        std::fs::write(
            &path,
            r#"[{"type":"session","data":{"id":"ses_1"}},{"type":"model","data":[]}]"#,
        )
        .unwrap();
        let items = read_items(&path).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind(), "session");
    }
}
