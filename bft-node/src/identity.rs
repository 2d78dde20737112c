//! Node and validator key management
//!
//! A node directory holds two ed25519 keys: the node key that names the node
//! on the peer network and the validator key referenced by the genesis
//! document. Both are created once and never replaced.

use crate::config::{
    CONFIG_DIR, DATA_DIR, NODE_KEY_FILE, PRIV_VALIDATOR_KEY_FILE, PRIV_VALIDATOR_STATE_FILE,
};
use crate::ports::PortFamily;
use crate::{NodeError, NodeResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey, KEYPAIR_LENGTH, SECRET_KEY_LENGTH};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

pub const PRIV_KEY_TYPE: &str = "tendermint/PrivKeyEd25519";
pub const PUB_KEY_TYPE: &str = "tendermint/PubKeyEd25519";

/// Length of node ids and validator addresses in bytes
pub const ADDRESS_LENGTH: usize = 20;

/// Typed key envelope as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEnvelope {
    #[serde(rename = "type")]
    pub key_type: String,
    pub value: String,
}

impl KeyEnvelope {
    fn private(key: &SigningKey) -> Self {
        Self {
            key_type: PRIV_KEY_TYPE.to_string(),
            value: BASE64.encode(key.to_keypair_bytes()),
        }
    }

    pub(crate) fn public(key: &VerifyingKey) -> Self {
        Self {
            key_type: PUB_KEY_TYPE.to_string(),
            value: BASE64.encode(key.as_bytes()),
        }
    }

    fn signing_key(&self) -> NodeResult<SigningKey> {
        if self.key_type != PRIV_KEY_TYPE {
            return Err(NodeError::Key(format!("Unsupported key type: {}", self.key_type)));
        }

        let bytes = BASE64
            .decode(&self.value)
            .map_err(|e| NodeError::Key(format!("Failed to decode key: {}", e)))?;
        let bytes: [u8; KEYPAIR_LENGTH] = bytes
            .try_into()
            .map_err(|_| NodeError::Key("Private key must be 64 bytes".to_string()))?;

        SigningKey::from_keypair_bytes(&bytes)
            .map_err(|e| NodeError::Key(format!("Inconsistent keypair: {}", e)))
    }
}

fn generate_signing_key() -> SigningKey {
    let mut secret = [0u8; SECRET_KEY_LENGTH];
    rand::rng().fill_bytes(&mut secret);
    SigningKey::from_bytes(&secret)
}

/// First 20 bytes of SHA-256 of the public key
pub fn address_of(key: &VerifyingKey) -> [u8; ADDRESS_LENGTH] {
    let digest = Sha256::digest(key.as_bytes());
    let mut address = [0u8; ADDRESS_LENGTH];
    address.copy_from_slice(&digest[..ADDRESS_LENGTH]);
    address
}

fn read_json<T: DeserializeOwned>(path: &Path) -> NodeResult<T> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

/// Write `value` to a file that must not exist yet
fn write_new_json<T: Serialize>(path: &Path, value: &T) -> NodeResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(&serde_json::to_vec_pretty(value)?)?;
    file.sync_all()?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct NodeKeyFile {
    priv_key: KeyEnvelope,
}

/// Peer-network identity of a node
#[derive(Clone)]
pub struct NodeKey {
    signing_key: SigningKey,
}

impl NodeKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        Self {
            signing_key: generate_signing_key(),
        }
    }

    /// Lowercase hex of the public key address
    pub fn node_id(&self) -> String {
        hex::encode(address_of(&self.public_key()))
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Load key from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> NodeResult<Self> {
        let file: NodeKeyFile = read_json(path.as_ref())?;
        Ok(Self {
            signing_key: file.priv_key.signing_key()?,
        })
    }

    /// Save key to a new file; fails if the file exists
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> NodeResult<()> {
        let file = NodeKeyFile {
            priv_key: KeyEnvelope::private(&self.signing_key),
        };
        write_new_json(path.as_ref(), &file)
    }

    /// Load the key if the file exists, otherwise generate and save one
    pub fn load_or_generate<P: AsRef<Path>>(path: P) -> NodeResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            let key = Self::load_from_file(path)?;
            tracing::info!(node_id = %key.node_id(), path = %path.display(), "Found node key");
            return Ok(key);
        }

        let key = Self::generate();
        key.save_to_file(path)?;
        tracing::info!(node_id = %key.node_id(), path = %path.display(), "Generated node key");
        Ok(key)
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKey")
            .field("node_id", &self.node_id())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize)]
struct PrivValidatorKeyFile {
    address: String,
    pub_key: KeyEnvelope,
    priv_key: KeyEnvelope,
}

/// Validator signing key
#[derive(Clone)]
pub struct PrivValidatorKey {
    signing_key: SigningKey,
}

impl PrivValidatorKey {
    pub fn generate() -> Self {
        Self {
            signing_key: generate_signing_key(),
        }
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn address(&self) -> [u8; ADDRESS_LENGTH] {
        address_of(&self.public_key())
    }

    /// Uppercase hex address, as written into genesis
    pub fn address_hex(&self) -> String {
        hex::encode_upper(self.address())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> NodeResult<Self> {
        let file: PrivValidatorKeyFile = read_json(path.as_ref())?;
        let key = Self {
            signing_key: file.priv_key.signing_key()?,
        };

        if !file.address.eq_ignore_ascii_case(&key.address_hex()) {
            return Err(NodeError::Key(format!(
                "Validator address {} does not match its key",
                file.address
            )));
        }
        Ok(key)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> NodeResult<()> {
        let file = PrivValidatorKeyFile {
            address: self.address_hex(),
            pub_key: KeyEnvelope::public(&self.public_key()),
            priv_key: KeyEnvelope::private(&self.signing_key),
        };
        write_new_json(path.as_ref(), &file)
    }

    pub fn load_or_generate<P: AsRef<Path>>(path: P) -> NodeResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_from_file(path);
        }

        let key = Self::generate();
        key.save_to_file(path)?;
        tracing::info!(address = %key.address_hex(), path = %path.display(), "Generated validator key");
        Ok(key)
    }
}

impl fmt::Debug for PrivValidatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivValidatorKey")
            .field("address", &self.address_hex())
            .finish_non_exhaustive()
    }
}

/// Last signed height/round/step of a validator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivValidatorState {
    pub height: u64,
    pub round: u32,
    pub step: u8,
}

impl PrivValidatorState {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> NodeResult<Self> {
        read_json(path.as_ref())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> NodeResult<()> {
        write_new_json(path.as_ref(), self)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> NodeResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_from_file(path);
        }

        let state = Self::default();
        state.save_to_file(path)?;
        Ok(state)
    }
}

/// Identity of one provisioned node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub node_id: String,
    /// `127.0.0.1:<p2p port>`
    pub network_address: String,
    /// Validator public key
    pub public_key: Vec<u8>,
    pub validator_address: Vec<u8>,
}

impl NodeIdentity {
    /// `<node id>@<network address>`
    pub fn peer_address(&self) -> String {
        format!("{}@{}", self.node_id, self.network_address)
    }
}

/// Load or create the keys of node `index` living in `node_dir`.
///
/// Existing files are only ever read. A file that exists but cannot be
/// decoded is an error, never a reason to generate a replacement.
pub fn ensure_identity<P: AsRef<Path>>(node_dir: P, index: usize) -> NodeResult<NodeIdentity> {
    let node_dir = node_dir.as_ref();
    let config_dir = node_dir.join(CONFIG_DIR);

    let validator = PrivValidatorKey::load_or_generate(config_dir.join(PRIV_VALIDATOR_KEY_FILE))?;
    PrivValidatorState::load_or_default(node_dir.join(DATA_DIR).join(PRIV_VALIDATOR_STATE_FILE))?;
    let node_key = NodeKey::load_or_generate(config_dir.join(NODE_KEY_FILE))?;

    Ok(NodeIdentity {
        node_id: node_key.node_id(),
        network_address: format!("127.0.0.1:{}", PortFamily::P2p.port(index)?),
        public_key: validator.public_key().as_bytes().to_vec(),
        validator_address: validator.address().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_node_id_format() {
        let key = NodeKey::generate();
        let id = key.node_id();
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_save_and_load_node_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("node_key.json");

        let original = NodeKey::generate();
        original.save_to_file(&path).unwrap();

        let loaded = NodeKey::load_from_file(&path).unwrap();
        assert_eq!(original.node_id(), loaded.node_id());
    }

    #[test]
    fn test_save_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("node_key.json");

        NodeKey::generate().save_to_file(&path).unwrap();
        assert!(NodeKey::generate().save_to_file(&path).is_err());
    }

    #[test]
    fn test_load_or_generate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys").join("priv_validator_key.json");

        let first = PrivValidatorKey::load_or_generate(&path).unwrap();
        assert!(path.exists());

        let second = PrivValidatorKey::load_or_generate(&path).unwrap();
        assert_eq!(first.address(), second.address());
        assert_eq!(first.public_key(), second.public_key());
    }

    #[test]
    fn test_corrupt_key_is_not_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("node_key.json");
        fs::write(&path, b"{}").unwrap();

        assert!(NodeKey::load_or_generate(&path).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn test_validator_address_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("priv_validator_key.json");
        PrivValidatorKey::generate().save_to_file(&path).unwrap();

        let mut file: PrivValidatorKeyFile = read_json(&path).unwrap();
        file.address = "00".repeat(ADDRESS_LENGTH);
        fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        assert!(matches!(
            PrivValidatorKey::load_from_file(&path),
            Err(NodeError::Key(_))
        ));
    }

    #[test]
    fn test_ensure_identity_is_idempotent() {
        let dir = tempdir().unwrap();

        let first = ensure_identity(dir.path(), 1).unwrap();
        assert_eq!(first.network_address, "127.0.0.1:26666");

        let files = [
            dir.path().join(CONFIG_DIR).join(NODE_KEY_FILE),
            dir.path().join(CONFIG_DIR).join(PRIV_VALIDATOR_KEY_FILE),
            dir.path().join(DATA_DIR).join(PRIV_VALIDATOR_STATE_FILE),
        ];
        let before: Vec<_> = files
            .iter()
            .map(|f| (fs::read(f).unwrap(), fs::metadata(f).unwrap().modified().unwrap()))
            .collect();

        let second = ensure_identity(dir.path(), 1).unwrap();
        assert_eq!(first, second);

        let after: Vec<_> = files
            .iter()
            .map(|f| (fs::read(f).unwrap(), fs::metadata(f).unwrap().modified().unwrap()))
            .collect();
        assert_eq!(before, after);
    }
}
