//! Local test-cluster provisioning
//!
//! `init_cluster` lays out `node0..nodeN-1` under one base directory, gives
//! every node its keys, writes one shared genesis document and links the
//! nodes through persistent peers on loopback.

use crate::config::{NodeConfig, CONFIG_DIR, DATA_DIR};
use crate::genesis::{GenesisDoc, GenesisValidator, DEFAULT_VOTING_POWER};
use crate::identity::ensure_identity;
use crate::ports::MAX_NODES;
use crate::{NodeError, NodeResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// `<base>/node<index>`
pub fn node_dir<P: AsRef<Path>>(base: P, index: usize) -> PathBuf {
    base.as_ref().join(format!("node{}", index))
}

/// Fixed shape of a provisioned cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    pub chain_id: String,
    /// Index order, identical in every genesis copy
    pub validators: Vec<GenesisValidator>,
    /// `<node id>@127.0.0.1:<p2p port>` per node, index order
    pub peers: Vec<String>,
}

impl ClusterTopology {
    pub fn node_count(&self) -> usize {
        self.peers.len()
    }

    /// All peers, comma separated
    pub fn persistent_peers(&self) -> String {
        self.peers.join(",")
    }

    /// Peers node `index` dials: everyone but itself
    pub fn peers_for(&self, index: usize) -> String {
        self.peers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, peer)| peer.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Provision `node_count` nodes under `base`.
///
/// Not resumable: `base` must be empty or absent, and on any failure the whole
/// base directory is removed.
pub fn init_cluster<P: AsRef<Path>>(base: P, node_count: usize) -> NodeResult<ClusterTopology> {
    let base = base.as_ref();

    if node_count == 0 || node_count > MAX_NODES {
        return Err(NodeError::Bootstrap(format!(
            "node count must be between 1 and {}, got {}",
            MAX_NODES, node_count
        )));
    }

    if base.exists() && fs::read_dir(base)?.next().is_some() {
        return Err(NodeError::Bootstrap(format!(
            "{} is not empty; clear it before provisioning",
            base.display()
        )));
    }

    provision_or_clean(base, node_count, provision)
}

/// Run `provision`, removing `base` entirely if it fails
fn provision_or_clean<F>(base: &Path, node_count: usize, provision: F) -> NodeResult<ClusterTopology>
where
    F: FnOnce(&Path, usize) -> NodeResult<ClusterTopology>,
{
    match provision(base, node_count) {
        Ok(topology) => {
            info!(
                base = %base.display(),
                nodes = node_count,
                chain_id = %topology.chain_id,
                "Cluster initialized"
            );
            Ok(topology)
        }
        Err(e) => {
            warn!(base = %base.display(), error = %e, "Bootstrap failed, removing base directory");
            if let Err(cleanup) = fs::remove_dir_all(base) {
                warn!(error = %cleanup, "Failed to remove base directory");
            }
            Err(e)
        }
    }
}

fn provision(base: &Path, node_count: usize) -> NodeResult<ClusterTopology> {
    let mut validators = Vec::with_capacity(node_count);
    let mut peers = Vec::with_capacity(node_count);

    for index in 0..node_count {
        let dir = node_dir(base, index);
        fs::create_dir_all(dir.join(CONFIG_DIR))?;
        fs::create_dir_all(dir.join(DATA_DIR))?;
        NodeConfig::default_for(&dir, index)?.save()?;

        let identity = ensure_identity(&dir, index)?;
        validators.push(GenesisValidator::from_parts(
            &identity.validator_address,
            &identity.public_key,
            DEFAULT_VOTING_POWER,
            format!("node{}", index),
        ));
        peers.push(identity.peer_address());
    }

    let topology = ClusterTopology {
        chain_id: GenesisDoc::random_chain_id(),
        validators,
        peers,
    };

    let genesis = GenesisDoc::new(topology.chain_id.clone(), topology.validators.clone());
    genesis.validate()?;
    // Serialized once so every node gets the same bytes.
    let genesis_bytes = genesis.to_bytes()?;

    for index in 0..node_count {
        let config = NodeConfig::default_for(node_dir(base, index), index)?
            .for_local_cluster()
            .with_persistent_peers(topology.peers_for(index))
            .with_moniker(random_moniker(index));
        config.validate()?;

        fs::write(config.genesis_path(), &genesis_bytes)?;
        config.save()?;
    }

    Ok(topology)
}

fn random_moniker(index: usize) -> String {
    format!("node{}-{:08x}", index, rand::random::<u32>())
}
