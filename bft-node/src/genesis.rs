//! Genesis document

use crate::identity::{PrivValidatorKey, PUB_KEY_TYPE};
use crate::{NodeError, NodeResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Voting power every demo validator gets
pub const DEFAULT_VOTING_POWER: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub value: String,
}

/// One validator of the initial set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Uppercase hex address
    pub address: String,
    pub pub_key: PubKey,
    pub power: u64,
    pub name: String,
}

impl GenesisValidator {
    pub fn from_key(key: &PrivValidatorKey, power: u64, name: impl Into<String>) -> Self {
        Self {
            address: key.address_hex(),
            pub_key: PubKey {
                key_type: PUB_KEY_TYPE.to_string(),
                value: BASE64.encode(key.public_key().as_bytes()),
            },
            power,
            name: name.into(),
        }
    }

    /// Build from raw key material
    pub fn from_parts(address: &[u8], public_key: &[u8], power: u64, name: impl Into<String>) -> Self {
        Self {
            address: hex::encode_upper(address),
            pub_key: PubKey {
                key_type: PUB_KEY_TYPE.to_string(),
                value: BASE64.encode(public_key),
            },
            power,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParams {
    pub max_bytes: u64,
    pub max_gas: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceParams {
    pub max_age_num_blocks: u64,
    pub max_age_duration_ms: u64,
    pub max_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorParams {
    pub pub_key_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub block: BlockParams,
    pub evidence: EvidenceParams,
    pub validator: ValidatorParams,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            block: BlockParams {
                max_bytes: 22_020_096,
                max_gas: -1,
            },
            evidence: EvidenceParams {
                max_age_num_blocks: 100_000,
                max_age_duration_ms: 48 * 60 * 60 * 1000,
                max_bytes: 1_048_576,
            },
            validator: ValidatorParams {
                pub_key_types: vec!["ed25519".to_string()],
            },
        }
    }
}

/// Cluster-wide agreement on chain id and initial validators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub genesis_time: DateTime<Utc>,
    pub chain_id: String,
    pub initial_height: u64,
    pub consensus_params: ConsensusParams,
    pub validators: Vec<GenesisValidator>,
    pub app_hash: String,
}

impl GenesisDoc {
    pub fn new(chain_id: impl Into<String>, validators: Vec<GenesisValidator>) -> Self {
        Self {
            genesis_time: Utc::now(),
            chain_id: chain_id.into(),
            initial_height: 1,
            consensus_params: ConsensusParams::default(),
            validators,
            app_hash: String::new(),
        }
    }

    /// `test-chain-` followed by six random alphanumerics
    pub fn random_chain_id() -> String {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        format!("test-chain-{}", suffix)
    }

    pub fn validate(&self) -> NodeResult<()> {
        if self.chain_id.is_empty() {
            return Err(NodeError::Genesis("chain_id must not be empty".to_string()));
        }

        if self.validators.is_empty() {
            return Err(NodeError::Genesis(
                "At least one validator is required".to_string(),
            ));
        }

        for (i, validator) in self.validators.iter().enumerate() {
            if validator.power == 0 {
                return Err(NodeError::Genesis(format!(
                    "Validator {} power must be greater than 0",
                    i
                )));
            }
        }

        Ok(())
    }

    /// Canonical bytes; every node must receive exactly these
    pub fn to_bytes(&self) -> NodeResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> NodeResult<Self> {
        let content = fs::read(path.as_ref())?;
        let doc: GenesisDoc = serde_json::from_slice(&content)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Find a validator by uppercase hex address
    pub fn validator_by_address(&self, address: &str) -> Option<&GenesisValidator> {
        self.validators
            .iter()
            .find(|v| v.address.eq_ignore_ascii_case(address))
    }
}
