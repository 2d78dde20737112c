//! Test-cluster node management
//!
//! This crate provisions validator identities, links N nodes into one
//! genesis/peer topology, runs a node with the application bound to a
//! consensus engine, and resynchronizes a failed node from a healthy peer.

pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod genesis;
pub mod identity;
pub mod local;
pub mod metrics;
pub mod ports;
pub mod recovery;
pub mod rpc;
pub mod runner;

pub use cluster::{init_cluster, node_dir, ClusterTopology};
pub use config::NodeConfig;
pub use engine::ConsensusEngine;
pub use error::{NodeError, NodeResult};
pub use genesis::{GenesisDoc, GenesisValidator};
pub use identity::{ensure_identity, NodeIdentity, NodeKey, PrivValidatorKey, PrivValidatorState};
pub use local::LocalEngine;
pub use ports::{shift_port, NodePorts, PortFamily};
pub use recovery::{recover, RecoveryReport};
pub use runner::{run, run_engine};
