//! Error taxonomy for the orchestration core.

use thiserror::Error;

use crate::domain::DispatchStage;

/// Errors from the fan-in queue
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,

    #[error("Queue is full")]
    Full,
}

/// A message-scoped pipeline failure. The message is dropped and the loop
/// moves on to the next one.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("History enrichment failed: {0:#}")]
    Enrichment(#[source] anyhow::Error),

    #[error("Agent logic failed: {0:#}")]
    Execution(#[source] anyhow::Error),

    #[error("Proof generation failed: {0:#}")]
    Proof(#[source] anyhow::Error),

    #[error("Proof publication failed: {0:#}")]
    Publication(#[source] anyhow::Error),
}

impl DispatchError {
    /// Stage the pipeline was in when the failure happened
    pub fn stage(&self) -> DispatchStage {
        match self {
            Self::Enrichment(_) => DispatchStage::Enriching,
            Self::Execution(_) => DispatchStage::Executing,
            Self::Proof(_) => DispatchStage::Proving,
            Self::Publication(_) => DispatchStage::Publishing,
        }
    }
}

/// One output port failing to deliver
#[derive(Debug, Error)]
#[error("Output port '{port}' failed: {error:#}")]
pub struct DeliveryFailure {
    /// Name of the failing port
    pub port: String,

    #[source]
    pub error: anyhow::Error,
}

/// Errors from checkpoint upload/download
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to upload checkpoint '{key}': {source:#}")]
    Upload {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to download checkpoint '{key}': {source:#}")]
    Download {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to delete checkpoint '{key}': {source:#}")]
    Delete {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to export section '{section}': {source:#}")]
    Export {
        section: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to encode runtime state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Checkpoint '{key}' is not a valid runtime state: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to restore section '{section}': {source:#}")]
    Restore {
        section: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("No checkpoint store configured")]
    NoStore,
}

/// Errors surfaced by [`Runtime`](super::Runtime) and its handle
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Runtime is not running")]
    NotRunning,

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Dispatch loop panicked: {0}")]
    DispatchPanic(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_stage() {
        let err = DispatchError::Execution(anyhow::anyhow!("boom"));
        assert_eq!(err.stage(), DispatchStage::Executing);
        assert_eq!(err.to_string(), "Agent logic failed: boom");
    }

    #[test]
    fn test_delivery_failure_display() {
        let failure = DeliveryFailure {
            port: "telegram".to_string(),
            error: anyhow::anyhow!("chat not found"),
        };
        assert_eq!(
            failure.to_string(),
            "Output port 'telegram' failed: chat not found"
        );
    }
}
