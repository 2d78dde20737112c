//! Node error types

use thiserror::Error;

pub type NodeResult<T> = Result<T, NodeError>;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config encoding error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Genesis error: {0}")]
    Genesis(String),

    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    #[error("Recovery error: {0}")]
    Recovery(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl From<walkdir::Error> for NodeError {
    fn from(err: walkdir::Error) -> Self {
        NodeError::Recovery(err.to_string())
    }
}
