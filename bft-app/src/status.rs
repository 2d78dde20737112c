//! Behavioral mode of a node

use crate::ParseStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a node answers transaction checks.
///
/// Only the administrative `status` query changes it; it is not part of the
/// replicated state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Accepts even values
    #[default]
    Correct,
    /// Accepts exactly what a correct node rejects
    Malicious,
    /// Neither confirms nor denies anything
    Inaccessible,
}

impl NodeStatus {
    /// All statuses in declaration order
    pub const ALL: [NodeStatus; 3] = [
        NodeStatus::Correct,
        NodeStatus::Malicious,
        NodeStatus::Inaccessible,
    ];

    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Correct => "Correct",
            NodeStatus::Malicious => "Malicious",
            NodeStatus::Inaccessible => "Inaccessible",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Correct" => Ok(NodeStatus::Correct),
            "Malicious" => Ok(NodeStatus::Malicious),
            "Inaccessible" => Ok(NodeStatus::Inaccessible),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}
