//! Replicated integer state machine
//!
//! This crate provides the application side of the consensus callback
//! protocol: the protocol types, the node status registry and a toy state
//! machine holding a single committed integer whose acceptance rule can be
//! flipped between honest and faulty at runtime.

pub mod abci;
pub mod app;
pub mod error;
pub mod status;

pub use abci::{Application, CommitResponse, InfoResponse, QueryResponse, RequestQuery, TxCode, TxResponse};
pub use app::BftApplication;
pub use error::{ParseStatusError, TxError, TxResult};
pub use status::NodeStatus;
