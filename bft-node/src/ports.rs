//! Per-index port assignment
//!
//! Every node of a local cluster listens on `base + 10 * index` for each port
//! family. The bases differ modulo 10 so two families never meet; the only
//! limit on cluster size is running out of `u16` for the highest base.

use crate::{NodeError, NodeResult};
use serde::{Deserialize, Serialize};

/// Offset between consecutive nodes
pub const PORT_SPACING: u16 = 10;

/// Number of nodes whose ports all fit in `u16`
pub const MAX_NODES: usize = ((u16::MAX - PortFamily::Metrics.base()) / PORT_SPACING) as usize + 1;

/// Listener kinds a node exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortFamily {
    P2p,
    Rpc,
    Proxy,
    Metrics,
}

impl PortFamily {
    pub const ALL: [PortFamily; 4] = [
        PortFamily::P2p,
        PortFamily::Rpc,
        PortFamily::Proxy,
        PortFamily::Metrics,
    ];

    /// Port used by node 0
    pub const fn base(self) -> u16 {
        match self {
            PortFamily::P2p => 26656,
            PortFamily::Rpc => 26657,
            PortFamily::Proxy => 26658,
            PortFamily::Metrics => 26660,
        }
    }

    /// Port of this family for node `index`
    pub fn port(self, index: usize) -> NodeResult<u16> {
        shift_port(self.base(), index)
    }
}

/// `base + 10 * index`, failing when it would leave the `u16` range
pub fn shift_port(base: u16, index: usize) -> NodeResult<u16> {
    u16::try_from(index)
        .ok()
        .and_then(|i| i.checked_mul(PORT_SPACING))
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| {
            NodeError::Config(format!(
                "node index {} does not fit the port range of base {}",
                index, base
            ))
        })
}

/// The four listener ports of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePorts {
    pub p2p: u16,
    pub rpc: u16,
    pub proxy: u16,
    pub metrics: u16,
}

impl NodePorts {
    pub fn for_index(index: usize) -> NodeResult<Self> {
        Ok(Self {
            p2p: PortFamily::P2p.port(index)?,
            rpc: PortFamily::Rpc.port(index)?,
            proxy: PortFamily::Proxy.port(index)?,
            metrics: PortFamily::Metrics.port(index)?,
        })
    }

    /// `tcp://0.0.0.0:<p2p>`
    pub fn p2p_laddr(&self) -> String {
        format!("tcp://0.0.0.0:{}", self.p2p)
    }

    /// `tcp://127.0.0.1:<rpc>`
    pub fn rpc_laddr(&self) -> String {
        format!("tcp://127.0.0.1:{}", self.rpc)
    }

    /// `tcp://127.0.0.1:<proxy>`
    pub fn proxy_app(&self) -> String {
        format!("tcp://127.0.0.1:{}", self.proxy)
    }

    /// `:<metrics>`
    pub fn prometheus_laddr(&self) -> String {
        format!(":{}", self.metrics)
    }
}
