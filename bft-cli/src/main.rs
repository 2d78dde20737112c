//! BFT demo cluster manager
//!
//! # Usage
//!
//! ```bash
//! # Provision four validators under ~/.bft-demo
//! bft-demo init 4
//!
//! # Run each node in its own terminal
//! bft-demo run 0
//!
//! # Make node 3 lie about transaction validity
//! bft-demo change-status 3 Malicious
//!
//! # Submit a value through node 0 and read it back
//! bft-demo tx 0 42
//! bft-demo query 0
//!
//! # Rebuild node 2's data from node 0 (node 2 must be stopped)
//! bft-demo recover 2 0
//! ```

mod client;

use anyhow::{Context, Result};
use bft_app::{BftApplication, NodeStatus};
use bft_node::{init_cluster, node_dir, recover};
use clap::{Parser, Subcommand, ValueEnum};
use client::AdminClient;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bft-demo")]
#[command(version, about = "Local BFT test cluster with switchable faulty nodes", long_about = None)]
struct Cli {
    /// Directory holding the node directories
    #[arg(long, global = true, env = "BFT_DEMO_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize node directories (wipes the base directory)
    Init {
        /// Number of validators
        nodes: usize,
    },

    /// Run node by index
    Run { node: usize },

    /// Copy the reference node's data onto a stopped node
    Recover { node: usize, reference: usize },

    /// Change node status by index (Correct, Malicious, Inaccessible)
    #[command(alias = "changeStatus")]
    ChangeStatus { node: usize, status: NodeStatus },

    /// Broadcast a transaction and wait for its block
    Tx { node: usize, value: i64 },

    /// Print the committed state of a node
    Query { node: usize },
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn default_base_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bft-demo")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let base_dir = cli.base_dir.unwrap_or_else(default_base_dir);

    match cli.command {
        Command::Init { nodes } => {
            if base_dir.exists() {
                std::fs::remove_dir_all(&base_dir)
                    .with_context(|| format!("failed to clear {}", base_dir.display()))?;
            }
            let topology = init_cluster(&base_dir, nodes).context("cluster bootstrap failed")?;

            info!(chain_id = %topology.chain_id, "Cluster ready");
            for (index, peer) in topology.peers.iter().enumerate() {
                println!("{} {}", node_dir(&base_dir, index).display(), peer);
            }
        }
        Command::Run { node } => {
            info!(node, base = %base_dir.display(), "Starting node");
            bft_node::run(BftApplication::new(), &base_dir, node)
                .await
                .with_context(|| format!("node {} failed", node))?;
        }
        Command::Recover { node, reference } => {
            let report = recover(&base_dir, node, reference)
                .with_context(|| format!("failed to recover node {} from {}", node, reference))?;
            println!(
                "copied {} files in {} directories, skipped {} node-local files",
                report.copied_files, report.copied_dirs, report.skipped_files
            );
        }
        Command::ChangeStatus { node, status } => {
            let response = AdminClient::for_node(node)?.change_status(status).await?;
            println!("{}", response);
        }
        Command::Tx { node, value } => {
            let response = AdminClient::for_node(node)?.broadcast_tx(value).await?;
            println!("{}", response);
        }
        Command::Query { node } => {
            let state = AdminClient::for_node(node)?.query_state().await?;
            println!("{}", state);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_change_status() {
        let cli = Cli::try_parse_from(["bft-demo", "changeStatus", "1", "Malicious"]).unwrap();
        match cli.command {
            Command::ChangeStatus { node, status } => {
                assert_eq!(node, 1);
                assert_eq!(status, NodeStatus::Malicious);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["bft-demo", "change-status", "1", "Evil"]).is_err());
    }

    #[test]
    fn test_parse_base_dir() {
        let cli = Cli::try_parse_from(["bft-demo", "init", "4", "--base-dir", "/tmp/cluster"]).unwrap();
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/cluster")));
        assert!(matches!(cli.command, Command::Init { nodes: 4 }));
    }
}
