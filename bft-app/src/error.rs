//! Application error types

use crate::abci::TxCode;
use thiserror::Error;

/// Business-level transaction rejection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// Payload is not a base-10 integer
    #[error("Invalid tx format, tx: {0}")]
    Encoding(String),

    /// Well-formed payload refused by the status policy
    #[error("Tx is not valid, tx: {0}")]
    NotValid(String),
}

impl TxError {
    /// Protocol code reported back to the engine
    pub fn code(&self) -> TxCode {
        match self {
            TxError::Encoding(_) => TxCode::EncodingError,
            TxError::NotValid(_) => TxCode::TxIsNotValid,
        }
    }
}

/// Unknown node status name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot parse Status: {0:?}")]
pub struct ParseStatusError(pub String);

/// Result type for transaction checks
pub type TxResult<T> = Result<T, TxError>;
