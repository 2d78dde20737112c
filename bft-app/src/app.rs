//! Single-integer state machine with switchable fault behavior

use crate::abci::{
    Application, CommitResponse, InfoResponse, QueryResponse, RequestQuery, TxCode, TxResponse,
};
use crate::{NodeStatus, TxError, TxResult};
use bytes::Bytes;
use tracing::{debug, info, warn};

/// Query path returning the committed value
pub const QUERY_PATH_STATE: &str = "state";
/// Query path replacing the node status
pub const QUERY_PATH_STATUS: &str = "status";

/// Outcome of the status policy for one payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Accepted and decoded
    Accepted(i64),
    /// Well-formed, but an inaccessible node takes no position
    Neutral,
}

/// The toy application: one committed integer.
///
/// `pending_state` holds the value produced by the current block and becomes
/// `state` on commit. Instances are driven by exactly one engine and are
/// never shared between nodes.
#[derive(Debug, Clone, Default)]
pub struct BftApplication {
    status: NodeStatus,
    state: i64,
    pending_state: Option<i64>,
}

impl BftApplication {
    /// Fresh application, `Correct` with state 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Start in the given status
    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Last committed value
    pub fn state(&self) -> i64 {
        self.state
    }

    /// Value executed in the current block, if any
    pub fn pending_state(&self) -> Option<i64> {
        self.pending_state
    }

    /// Decode and apply the status policy
    fn admit(&self, tx: &[u8]) -> TxResult<Admission> {
        let text = String::from_utf8_lossy(tx);
        let value = decode_value(tx).ok_or_else(|| TxError::Encoding(text.to_string()))?;

        // Malicious nodes invert the rule a correct node applies.
        let wants_even = match self.status {
            NodeStatus::Correct => true,
            NodeStatus::Malicious => false,
            NodeStatus::Inaccessible => return Ok(Admission::Neutral),
        };

        if (value % 2 == 0) == wants_even {
            Ok(Admission::Accepted(value))
        } else {
            Err(TxError::NotValid(text.to_string()))
        }
    }

    fn log_action(&self, action: &str, tx: &[u8]) {
        info!(
            action,
            tx = %String::from_utf8_lossy(tx),
            state = self.state,
            status = %self.status,
            "Application callback"
        );
    }
}

/// Base-10 integer with optional sign
fn decode_value(tx: &[u8]) -> Option<i64> {
    std::str::from_utf8(tx).ok()?.parse().ok()
}

fn response_for(result: &TxResult<Admission>) -> TxResponse {
    match result {
        Ok(_) => TxResponse::ok(),
        Err(e) => TxResponse::rejected(e.code(), e.to_string()),
    }
}

impl Application for BftApplication {
    fn info(&self) -> InfoResponse {
        InfoResponse {
            data: format!("state={},status={}", self.state, self.status),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn check_tx(&self, tx: &[u8]) -> TxResponse {
        let result = self.admit(tx);
        self.log_action("CheckTx", tx);
        response_for(&result)
    }

    fn deliver_tx(&mut self, tx: &[u8]) -> TxResponse {
        // The engine may deliver a tx it never checked, so the policy runs again.
        let result = self.admit(tx);
        if let Ok(Admission::Accepted(value)) = result {
            self.pending_state = Some(value);
        }
        self.log_action("DeliverTx", tx);
        response_for(&result)
    }

    fn commit(&mut self) -> CommitResponse {
        let Some(value) = self.pending_state.take() else {
            debug!(state = self.state, "Nothing to commit");
            return CommitResponse::default();
        };

        self.state = value;
        self.log_action("Commit", b"");
        CommitResponse {
            data: Some(Bytes::new()),
        }
    }

    fn query(&mut self, request: RequestQuery) -> QueryResponse {
        self.log_action("Query", b"");

        match request.path.as_str() {
            QUERY_PATH_STATE => QueryResponse {
                value: Bytes::from(self.state.to_string()),
                ..Default::default()
            },
            QUERY_PATH_STATUS => {
                let name = String::from_utf8_lossy(&request.data);
                match name.parse::<NodeStatus>() {
                    Ok(status) => {
                        info!(from = %self.status, to = %status, "Node status changed");
                        self.status = status;
                        QueryResponse {
                            log: format!("status set to {}", status),
                            ..Default::default()
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Rejected status change");
                        QueryResponse {
                            code: TxCode::UnknownError.as_u32(),
                            log: e.to_string(),
                            ..Default::default()
                        }
                    }
                }
            }
            other => QueryResponse {
                log: format!(
                    "Invalid query path. Expected {} or {}, got {}",
                    QUERY_PATH_STATE, QUERY_PATH_STATUS, other
                ),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn app_with(status: NodeStatus) -> BftApplication {
        BftApplication::new().with_status(status)
    }

    fn query_state(app: &mut BftApplication) -> String {
        let resp = app.query(RequestQuery::new(QUERY_PATH_STATE, Bytes::new()));
        String::from_utf8(resp.value.to_vec()).unwrap()
    }

    proptest! {
        #[test]
        fn prop_correct_accepts_even_rejects_odd(v in any::<i64>()) {
            let mut app = app_with(NodeStatus::Correct);
            let tx = v.to_string();
            let check = app.check_tx(tx.as_bytes());
            let deliver = app.deliver_tx(tx.as_bytes());
            if v % 2 == 0 {
                prop_assert!(check.is_ok());
                prop_assert!(deliver.is_ok());
            } else {
                prop_assert_eq!(check.code, TxCode::TxIsNotValid.as_u32());
                prop_assert_eq!(deliver.code, TxCode::TxIsNotValid.as_u32());
            }
        }

        #[test]
        fn prop_malicious_inverts_rule(v in any::<i64>()) {
            let mut app = app_with(NodeStatus::Malicious);
            let tx = v.to_string();
            let check = app.check_tx(tx.as_bytes());
            let deliver = app.deliver_tx(tx.as_bytes());
            if v % 2 == 0 {
                prop_assert_eq!(check.code, TxCode::TxIsNotValid.as_u32());
                prop_assert_eq!(deliver.code, TxCode::TxIsNotValid.as_u32());
            } else {
                prop_assert!(check.is_ok());
                prop_assert!(deliver.is_ok());
            }
        }

        #[test]
        fn prop_non_integers_are_encoding_errors(s in "[a-zA-Z ._]{1,16}") {
            for status in NodeStatus::ALL {
                let mut app = app_with(status);
                prop_assert_eq!(app.check_tx(s.as_bytes()).code, TxCode::EncodingError.as_u32());
                prop_assert_eq!(app.deliver_tx(s.as_bytes()).code, TxCode::EncodingError.as_u32());
                prop_assert_eq!(app.pending_state(), None);
            }
        }
    }

    #[test]
    fn test_encoding_error_log() {
        let app = BftApplication::new();
        let resp = app.check_tx(b"12a");
        assert_eq!(resp.code, TxCode::EncodingError.as_u32());
        assert_eq!(resp.log, "Invalid tx format, tx: 12a");

        let resp = app.check_tx(&[0xff, 0xfe]);
        assert_eq!(resp.code, TxCode::EncodingError.as_u32());
    }

    #[test]
    fn test_signed_values() {
        let app = BftApplication::new();
        assert!(app.check_tx(b"-4").is_ok());
        assert!(app.check_tx(b"+8").is_ok());
        assert!(!app.check_tx(b"-3").is_ok());
        assert!(!app.check_tx(b" 4").is_ok());
    }

    #[test]
    fn test_inaccessible_is_neutral() {
        let mut app = app_with(NodeStatus::Inaccessible);
        assert_eq!(app.check_tx(b"3"), TxResponse::ok());
        assert_eq!(app.check_tx(b"4"), TxResponse::ok());
        assert_eq!(app.deliver_tx(b"4"), TxResponse::ok());
        assert_eq!(app.pending_state(), None);
        assert_eq!(app.commit(), CommitResponse::default());
        assert_eq!(app.state(), 0);
    }

    #[test]
    fn test_inaccessible_still_rejects_malformed() {
        let mut app = app_with(NodeStatus::Inaccessible);

        let resp = app.check_tx(b"not-a-number");
        assert_eq!(resp.code, TxCode::EncodingError.as_u32());
        assert_eq!(resp.log, "Invalid tx format, tx: not-a-number");

        let resp = app.deliver_tx(b"not-a-number");
        assert_eq!(resp.code, TxCode::EncodingError.as_u32());
        assert_eq!(app.pending_state(), None);
    }

    #[test]
    fn test_commit_applies_last_accepted_value() {
        let mut app = BftApplication::new();
        assert!(app.deliver_tx(b"2").is_ok());
        assert!(!app.deliver_tx(b"5").is_ok());
        assert!(app.deliver_tx(b"10").is_ok());
        assert_eq!(app.pending_state(), Some(10));

        let resp = app.commit();
        assert_eq!(resp.data, Some(Bytes::new()));
        assert_eq!(app.state(), 10);
        assert_eq!(app.pending_state(), None);
    }

    #[test]
    fn test_empty_commit_is_noop() {
        let mut app = BftApplication::new();
        app.deliver_tx(b"6");
        app.commit();

        assert!(!app.deliver_tx(b"7").is_ok());
        let resp = app.commit();
        assert_eq!(resp.data, None);
        assert_eq!(app.state(), 6);
    }

    #[test]
    fn test_query_state_ignores_pending() {
        let mut app = BftApplication::new();
        app.deliver_tx(b"4");
        assert_eq!(query_state(&mut app), "0");
        app.commit();
        assert_eq!(query_state(&mut app), "4");
    }

    #[test]
    fn test_query_status_flips_behavior() {
        let mut app = BftApplication::new();
        assert!(app.check_tx(b"4").is_ok());

        let resp = app.query(RequestQuery::new(QUERY_PATH_STATUS, "Malicious"));
        assert!(resp.is_ok());
        assert_eq!(app.status(), NodeStatus::Malicious);
        assert!(!app.check_tx(b"4").is_ok());
        assert!(app.check_tx(b"3").is_ok());
    }

    #[test]
    fn test_query_bad_status_keeps_status() {
        let mut app = app_with(NodeStatus::Malicious);
        let resp = app.query(RequestQuery::new(QUERY_PATH_STATUS, "not-a-status"));
        assert_eq!(resp.code, TxCode::UnknownError.as_u32());
        assert_eq!(app.status(), NodeStatus::Malicious);
    }

    #[test]
    fn test_query_unknown_path() {
        let mut app = BftApplication::new();
        let resp = app.query(RequestQuery::new("balance", Bytes::new()));
        assert!(resp.is_ok());
        assert!(resp.value.is_empty());
        assert!(resp.log.contains("got balance"));
    }

    #[test]
    fn test_info() {
        let app = BftApplication::new().with_status(NodeStatus::Malicious);
        assert_eq!(app.info().data, "state=0,status=Malicious");
    }
}
