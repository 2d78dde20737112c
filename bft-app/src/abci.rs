//! Consensus callback protocol
//!
//! The engine owns block production and calls back into the application in a
//! fixed order: `check_tx` for admission, then `deliver_tx` for every
//! transaction of a block followed by a single `commit`. `query` only runs
//! between blocks. The engine serializes all calls on one instance.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Response codes carried in the `code` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum TxCode {
    Ok = 0,
    EncodingError = 1,
    UnknownError = 4,
    TxIsNotValid = 5,
}

impl TxCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn is_ok(self) -> bool {
        self == TxCode::Ok
    }
}

impl From<TxCode> for u32 {
    fn from(code: TxCode) -> Self {
        code.as_u32()
    }
}

/// Result of `check_tx` and `deliver_tx`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    pub code: u32,
    pub log: String,
}

impl TxResponse {
    /// Accepted with an empty log
    pub fn ok() -> Self {
        Self::default()
    }

    /// Rejected with the given code and log
    pub fn rejected(code: TxCode, log: impl Into<String>) -> Self {
        Self {
            code: code.as_u32(),
            log: log.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == TxCode::Ok.as_u32()
    }
}

/// Result of `commit`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResponse {
    /// `None` when nothing was executed since the last commit
    pub data: Option<Bytes>,
}

/// Query request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuery {
    pub path: String,
    pub data: Bytes,
}

impl RequestQuery {
    pub fn new(path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }
}

/// Query response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResponse {
    pub code: u32,
    pub value: Bytes,
    pub log: String,
}

impl QueryResponse {
    pub fn is_ok(&self) -> bool {
        self.code == TxCode::Ok.as_u32()
    }
}

/// Result of `info`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub data: String,
    pub version: String,
}

/// Application side of the callback protocol
pub trait Application: Send + 'static {
    /// Describe the application
    fn info(&self) -> InfoResponse {
        InfoResponse::default()
    }

    /// Admission check for the mempool
    fn check_tx(&self, tx: &[u8]) -> TxResponse;

    /// Execute one transaction of the current block
    fn deliver_tx(&mut self, tx: &[u8]) -> TxResponse;

    /// Make the current block's effects durable
    fn commit(&mut self) -> CommitResponse;

    /// Read state or issue an administrative command
    fn query(&mut self, request: RequestQuery) -> QueryResponse;
}
