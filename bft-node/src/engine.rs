//! Consensus engine seam
//!
//! The node runner only needs to start an engine, ask it to stop and wait for
//! it to finish. Everything between those calls is driven by the engine
//! through the application callbacks.

use crate::NodeResult;
use serde::Serialize;
use std::future::Future;

/// Lifecycle of a consensus engine bound to one application
pub trait ConsensusEngine: Send {
    /// Bind listeners and spawn the engine's tasks
    fn start(&mut self) -> impl Future<Output = NodeResult<()>> + Send;

    /// Request shutdown; returns immediately
    fn stop(&mut self);

    /// Resolve once every task has exited
    fn wait(&mut self) -> impl Future<Output = NodeResult<()>> + Send;

    /// Whether `start` succeeded and `stop` has not been called
    fn is_running(&self) -> bool;
}

/// Static description of a running node, served on `/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub moniker: String,
    pub chain_id: String,
    pub validator_address: String,
    pub p2p_laddr: String,
    pub rpc_laddr: String,
    pub persistent_peers: Vec<String>,
}
