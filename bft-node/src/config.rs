//! Node configuration
//!
//! One TOML file per node at `<node dir>/config/config.toml`. It is read once
//! when the node starts; nothing else holds settings.

use crate::ports::{NodePorts, PortFamily};
use crate::{NodeError, NodeResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = "config";
pub const DATA_DIR: &str = "data";
pub const CONFIG_FILE: &str = "config.toml";
pub const GENESIS_FILE: &str = "genesis.json";
pub const NODE_KEY_FILE: &str = "node_key.json";
pub const PRIV_VALIDATOR_KEY_FILE: &str = "priv_validator_key.json";
/// Mutable signing state; local to one validator and never copied between nodes
pub const PRIV_VALIDATOR_STATE_FILE: &str = "priv_validator_state.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node directory; derived from the file location, never stored
    #[serde(skip)]
    pub root_dir: PathBuf,

    /// Human readable node name
    pub moniker: String,

    /// Default tracing filter for the node process
    pub log_level: String,

    /// Address the engine uses to reach the application
    pub proxy_app: String,

    /// Paths relative to the node directory
    pub genesis_file: PathBuf,
    pub node_key_file: PathBuf,
    pub priv_validator_key_file: PathBuf,
    pub priv_validator_state_file: PathBuf,

    pub p2p: P2pConfig,
    pub rpc: RpcConfig,
    pub consensus: ConsensusConfig,
    pub instrumentation: InstrumentationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P2pConfig {
    pub laddr: String,
    /// Comma separated `<node id>@<host>:<port>`
    pub persistent_peers: String,
    pub addr_book_strict: bool,
    pub allow_duplicate_ip: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    pub laddr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// How long a block stays open for more transactions
    pub timeout_commit_ms: u64,
    pub max_block_txs: usize,
    pub wal_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    pub prometheus: bool,
    pub prometheus_listen_addr: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let ports = NodePorts {
            p2p: PortFamily::P2p.base(),
            rpc: PortFamily::Rpc.base(),
            proxy: PortFamily::Proxy.base(),
            metrics: PortFamily::Metrics.base(),
        };
        Self::with_ports(PathBuf::new(), "node0".to_string(), ports)
    }
}

impl NodeConfig {
    /// Baseline configuration for node `index` rooted at `root_dir`
    pub fn default_for(root_dir: impl Into<PathBuf>, index: usize) -> NodeResult<Self> {
        Ok(Self::with_ports(
            root_dir.into(),
            format!("node{}", index),
            NodePorts::for_index(index)?,
        ))
    }

    fn with_ports(root_dir: PathBuf, moniker: String, ports: NodePorts) -> Self {
        Self {
            root_dir,
            moniker,
            log_level: "info".to_string(),
            proxy_app: ports.proxy_app(),
            genesis_file: Path::new(CONFIG_DIR).join(GENESIS_FILE),
            node_key_file: Path::new(CONFIG_DIR).join(NODE_KEY_FILE),
            priv_validator_key_file: Path::new(CONFIG_DIR).join(PRIV_VALIDATOR_KEY_FILE),
            priv_validator_state_file: Path::new(DATA_DIR).join(PRIV_VALIDATOR_STATE_FILE),
            p2p: P2pConfig {
                laddr: ports.p2p_laddr(),
                persistent_peers: String::new(),
                addr_book_strict: true,
                allow_duplicate_ip: false,
            },
            rpc: RpcConfig {
                laddr: ports.rpc_laddr(),
            },
            consensus: ConsensusConfig {
                timeout_commit_ms: 1000,
                max_block_txs: 1000,
                wal_path: Path::new(DATA_DIR).join("cs.wal").join("wal"),
            },
            instrumentation: InstrumentationConfig {
                prometheus: true,
                prometheus_listen_addr: ports.prometheus_laddr(),
            },
        }
    }

    /// Point every listener at the ports of node `index`
    pub fn with_ports_of(mut self, ports: NodePorts) -> Self {
        self.p2p.laddr = ports.p2p_laddr();
        self.rpc.laddr = ports.rpc_laddr();
        self.proxy_app = ports.proxy_app();
        self.instrumentation.prometheus_listen_addr = ports.prometheus_laddr();
        self
    }

    /// Set persistent peers
    pub fn with_persistent_peers(mut self, peers: impl Into<String>) -> Self {
        self.p2p.persistent_peers = peers.into();
        self
    }

    /// Set moniker
    pub fn with_moniker(mut self, moniker: impl Into<String>) -> Self {
        self.moniker = moniker.into();
        self
    }

    /// Settings for many nodes sharing one loopback interface
    pub fn for_local_cluster(mut self) -> Self {
        self.p2p.addr_book_strict = false;
        self.p2p.allow_duplicate_ip = true;
        self
    }

    /// `<root>/config/config.toml`
    pub fn config_file(&self) -> PathBuf {
        config_file_in(&self.root_dir)
    }

    pub fn genesis_path(&self) -> PathBuf {
        self.root_dir.join(&self.genesis_file)
    }

    pub fn node_key_path(&self) -> PathBuf {
        self.root_dir.join(&self.node_key_file)
    }

    pub fn priv_validator_key_path(&self) -> PathBuf {
        self.root_dir.join(&self.priv_validator_key_file)
    }

    pub fn priv_validator_state_path(&self) -> PathBuf {
        self.root_dir.join(&self.priv_validator_state_file)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root_dir.join(DATA_DIR)
    }

    pub fn timeout_commit(&self) -> Duration {
        Duration::from_millis(self.consensus.timeout_commit_ms)
    }

    /// Persistent peers split into entries
    pub fn persistent_peers(&self) -> Vec<&str> {
        self.p2p
            .persistent_peers
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Load configuration from the node directory
    pub fn load_from_dir<P: AsRef<Path>>(root_dir: P) -> NodeResult<Self> {
        let path = config_file_in(root_dir.as_ref());
        let content = fs::read_to_string(&path).map_err(|e| {
            NodeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config: NodeConfig = toml::from_str(&content)?;
        config.root_dir = root_dir.as_ref().to_path_buf();
        Ok(config)
    }

    /// Save configuration into `<root>/config/config.toml`
    pub fn save(&self) -> NodeResult<()> {
        let path = self.config_file();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> NodeResult<()> {
        if self.moniker.trim().is_empty() {
            return Err(NodeError::Config("moniker must not be empty".to_string()));
        }

        parse_laddr(&self.p2p.laddr)?;
        parse_laddr(&self.rpc.laddr)?;
        parse_laddr(&self.proxy_app)?;
        if self.instrumentation.prometheus {
            parse_laddr(&self.instrumentation.prometheus_listen_addr)?;
        }

        if self.consensus.timeout_commit_ms == 0 {
            return Err(NodeError::Config(
                "timeout_commit_ms must be greater than 0".to_string(),
            ));
        }

        if self.consensus.max_block_txs == 0 {
            return Err(NodeError::Config(
                "max_block_txs must be greater than 0".to_string(),
            ));
        }

        for peer in self.persistent_peers() {
            validate_peer(peer)?;
        }

        Ok(())
    }
}

fn config_file_in(root_dir: &Path) -> PathBuf {
    root_dir.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Accepts `tcp://host:port`, `host:port` and `:port`
pub fn parse_laddr(laddr: &str) -> NodeResult<SocketAddr> {
    let addr = laddr.strip_prefix("tcp://").unwrap_or(laddr);
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };

    addr.parse()
        .map_err(|e| NodeError::Config(format!("Invalid listen address '{}': {}", laddr, e)))
}

/// `<40 hex chars>@<host>:<port>`
fn validate_peer(peer: &str) -> NodeResult<()> {
    let invalid = |reason: &str| NodeError::Config(format!("Invalid peer '{}': {}", peer, reason));

    let (id, addr) = peer.split_once('@').ok_or_else(|| invalid("missing '@'"))?;
    if id.len() != 40 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("node id must be 40 hex characters"));
    }

    let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    port.parse::<u16>().map_err(|_| invalid("bad port"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PEER_ID: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rpc.laddr, "tcp://127.0.0.1:26657");
        assert!(config.p2p.addr_book_strict);
    }

    #[test]
    fn test_default_matches_node_zero() {
        let ports = NodePorts::for_index(0).unwrap();
        let config = NodeConfig::default();
        assert_eq!(config.p2p.laddr, ports.p2p_laddr());
        assert_eq!(config.rpc.laddr, ports.rpc_laddr());
        assert_eq!(config.proxy_app, ports.proxy_app());
        assert_eq!(
            config.instrumentation.prometheus_listen_addr,
            ports.prometheus_laddr()
        );
    }

    #[test]
    fn test_default_for_index() {
        let config = NodeConfig::default_for("/tmp/node2", 2).unwrap();
        assert_eq!(config.moniker, "node2");
        assert_eq!(config.rpc.laddr, "tcp://127.0.0.1:26677");
        assert_eq!(config.proxy_app, "tcp://127.0.0.1:26678");
        assert_eq!(config.instrumentation.prometheus_listen_addr, ":26680");
        assert_eq!(
            config.priv_validator_state_path(),
            PathBuf::from("/tmp/node2/data/priv_validator_state.json")
        );
    }

    #[test]
    fn test_config_builder() {
        let config = NodeConfig::default()
            .with_moniker("alpha")
            .with_persistent_peers(format!("{}@127.0.0.1:26666", PEER_ID))
            .for_local_cluster();

        assert_eq!(config.moniker, "alpha");
        assert!(!config.p2p.addr_book_strict);
        assert!(config.p2p.allow_duplicate_ip);
        assert_eq!(config.persistent_peers().len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config = NodeConfig::default_for(dir.path(), 1)
            .unwrap()
            .with_persistent_peers(format!("{}@127.0.0.1:26656", PEER_ID));
        config.save().unwrap();

        let loaded = NodeConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            NodeConfig::load_from_dir(dir.path()),
            Err(NodeError::Config(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = NodeConfig::default();
        config.consensus.timeout_commit_ms = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.rpc.laddr = "tcp://nowhere".to_string();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.moniker = " ".to_string();
        assert!(config.validate().is_err());

        let config = NodeConfig::default().with_persistent_peers("abc@127.0.0.1:1");
        assert!(config.validate().is_err());

        let config = NodeConfig::default().with_persistent_peers(format!("{}@127.0.0.1", PEER_ID));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_laddr() {
        assert_eq!(
            parse_laddr("tcp://127.0.0.1:26657").unwrap(),
            "127.0.0.1:26657".parse().unwrap()
        );
        assert_eq!(
            parse_laddr(":26660").unwrap(),
            "0.0.0.0:26660".parse().unwrap()
        );
        assert!(parse_laddr("localhost").is_err());
    }
}
