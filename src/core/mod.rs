//! Core orchestration logic.
//!
//! This module contains:
//! - Queue: Fan-in channel shared by all input ports
//! - Dispatch: The single sequential consumer running the pipeline
//! - Checkpoint: Snapshot upload/download against a blob store
//! - Runtime: Wiring, lifetime and shutdown

pub mod checkpoint;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod runtime;

// Re-export commonly used types
pub use checkpoint::{CheckpointManager, CheckpointStore, DEFAULT_CHECKPOINT_KEY, LOGIC_SECTION};
pub use dispatch::{DeliveryReport, DispatchLoop, DispatchStats, Outcome};
pub use error::{CheckpointError, DeliveryFailure, DispatchError, QueueError, RuntimeError};
pub use queue::{fan_in, QueueReceiver, QueueSink};
pub use runtime::{RunSummary, Runtime, RuntimeBuilder, RuntimeHandle};
