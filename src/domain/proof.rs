//! Opaque integrity artifact attached to a processed request/response pair.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Proof produced by a [`ProofGenerator`](crate::collaborators::ProofGenerator).
///
/// The runtime never looks inside a proof; it only carries it from the
/// generator to the publisher and the output ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proof(String);

impl Proof {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Proof {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Proof {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
