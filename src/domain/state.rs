//! Runtime state snapshots and the dispatch stage machine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current snapshot format
pub const STATE_VERSION: u32 = 1;

/// Opaque snapshot of runtime state.
///
/// Each stateful collaborator owns one named section. The runtime stores and
/// returns sections verbatim and never interprets their contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    /// Snapshot format version
    pub version: u32,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,

    /// Collaborator sections keyed by name
    #[serde(default)]
    pub sections: BTreeMap<String, Value>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            taken_at: Utc::now(),
            sections: BTreeMap::new(),
        }
    }
}

impl RuntimeState {
    /// Empty snapshot stamped with the current time
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a section by name
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    /// Insert or replace a section
    pub fn insert_section(&mut self, name: impl Into<String>, value: Value) {
        self.sections.insert(name.into(), value);
    }

    /// True when no collaborator contributed anything
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Encode as JSON bytes for a checkpoint store
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Decode from checkpoint store bytes
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Where the dispatch loop currently is in its per-message pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStage {
    /// Blocked on the next queue item
    Waiting,

    /// History collaborator is augmenting the request
    Enriching,

    /// User logic is running
    Executing,

    /// Proof generator is running
    Proving,

    /// Proof publisher is running
    Publishing,

    /// Output ports are receiving the result
    Delivering,

    /// Loop has exited
    Stopped,
}

impl DispatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Enriching => "enriching",
            Self::Executing => "executing",
            Self::Proving => "proving",
            Self::Publishing => "publishing",
            Self::Delivering => "delivering",
            Self::Stopped => "stopped",
        }
    }

    /// True while a message is in flight
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Waiting | Self::Stopped)
    }
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_bytes_round_trip() {
        let mut state = RuntimeState::new();
        state.insert_section("seen_payments", serde_json::json!(["sig1", "sig2"]));

        let decoded = RuntimeState::from_bytes(&state.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(
            decoded.section("seen_payments"),
            Some(&serde_json::json!(["sig1", "sig2"]))
        );
    }

    #[test]
    fn test_missing_sections_field_defaults_to_empty() {
        let json = r#"{"version":1,"taken_at":"2024-01-01T00:00:00Z"}"#;
        let state = RuntimeState::from_bytes(json.as_bytes()).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_stage_busy() {
        assert!(!DispatchStage::Waiting.is_busy());
        assert!(!DispatchStage::Stopped.is_busy());
        assert!(DispatchStage::Executing.is_busy());
        assert_eq!(DispatchStage::Delivering.to_string(), "delivering");
    }
}
