//! agent-runtime - Fan-in agent execution runtime
//!
//! Hosts one user-supplied agent behind any number of input and output
//! ports. Every input port feeds a single queue; one dispatch loop takes
//! messages off it strictly one at a time and runs each through a fixed
//! pipeline:
//!
//! 1. Enrich the request with conversation history
//! 2. Execute the agent logic (which may decline to reply)
//! 3. Generate and publish an integrity proof
//! 4. Deliver (request, response, proof) to every output port concurrently
//!
//! Runtime state (short-term memory and any agent state) can be exported to
//! a blob store and restored on the next start.
//!
//! # Modules
//!
//! - `domain`: Data structures (Message, Proof, RuntimeState)
//! - `core`: Queue, dispatch loop, checkpointing, runtime wiring
//! - `ports`: Input/output port traits
//! - `collaborators`: Agent logic, history and proof seams
//! - `adapters`: Concrete ports, logic and checkpoint stores
//! - `config`: Layered configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Answer one message and exit
//! agent-runtime run -m "hello"
//!
//! # Run the configured ports until Ctrl-C
//! agent-runtime run
//!
//! # Inspect the stored state
//! agent-runtime checkpoint show
//! ```

pub mod adapters;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod core;
pub mod domain;
pub mod ports;

// Re-export main types at crate root for convenience
pub use collaborators::{AgentLogic, HistoryProvider, ProofGenerator, ProofPublisher};
pub use core::{CheckpointManager, CheckpointStore, RunSummary, Runtime, RuntimeBuilder, RuntimeHandle};
pub use domain::{DispatchStage, Message, Proof, RuntimeState};
pub use ports::{InputPort, OutputPort};
