//! Port contracts for adapters.
//!
//! Input ports are producers feeding the fan-in queue; output ports are
//! consumers receiving each completed `(request, response, proof)` triple.
//! A single adapter can implement both and be registered on both sides.

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::QueueSink;
use crate::domain::{Message, Proof};

/// An independently scheduled producer of messages
#[async_trait]
pub trait InputPort: Send + Sync {
    /// Human-readable port name, used in logs
    fn name(&self) -> &str;

    /// Push messages into `sink` until `shutdown` fires.
    ///
    /// Runs on its own task for the whole runtime lifetime. Returning `Ok`
    /// means the port finished on its own; an error is reported and isolated
    /// to this port.
    async fn start(&self, sink: QueueSink, shutdown: CancellationToken) -> Result<()>;
}

/// A consumer that delivers a completed result
#[async_trait]
pub trait OutputPort: Send + Sync {
    /// Human-readable port name, used in logs and delivery reports
    fn name(&self) -> &str;

    /// Deliver one result. Failures never affect sibling ports.
    async fn send(&self, request: &Message, response: &Message, proof: &Proof) -> Result<()>;
}
