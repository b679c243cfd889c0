//! Domain types for the agent runtime.
//!
//! This module contains the core data structures:
//! - Message: Immutable request/response envelope
//! - Proof: Opaque integrity artifact
//! - RuntimeState: Checkpointable snapshot and dispatch stages

pub mod message;
pub mod proof;
pub mod state;

// Re-export commonly used types
pub use message::Message;
pub use proof::Proof;
pub use state::{DispatchStage, RuntimeState, STATE_VERSION};
