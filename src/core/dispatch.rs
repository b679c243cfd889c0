//! The dispatch loop: single consumer of the fan-in queue.
//!
//! Each message runs the full pipeline before the next one is dequeued:
//!
//! ```text
//! Waiting → Enriching → Executing ─┬→ Proving → Publishing → Delivering → Waiting
//!                                  └→ Waiting (no reply)
//! ```
//!
//! Failures are message-scoped, including a panic inside the agent logic.
//! The loop reports them and goes back to waiting. Only shutdown or a
//! drained, closed queue ends the loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::collaborators::memory::MEMORY_SECTION;
use crate::collaborators::{
    AgentLogic, DigestProofGenerator, HistoryProvider, NoopProofPublisher, ProofGenerator,
    ProofPublisher, ShortTermMemory,
};
use crate::domain::{DispatchStage, Message, Proof, RuntimeState};
use crate::ports::OutputPort;

use super::checkpoint::LOGIC_SECTION;
use super::error::{CheckpointError, DeliveryFailure, DispatchError};
use super::queue::QueueReceiver;

/// Requests served by the loop between cycles
pub(crate) enum Control {
    Export(oneshot::Sender<Result<RuntimeState, CheckpointError>>),
}

/// Result of delivering one response to every output port
#[derive(Debug)]
pub struct DeliveryReport {
    /// Ports that accepted the result
    pub delivered: Vec<String>,

    /// Ports that failed, in registration order
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// What happened to one message
#[derive(Debug)]
pub enum Outcome {
    /// Agent logic produced no response; nothing was proved or delivered
    NoReply,

    /// Response was proved, published and handed to the output ports
    Delivered {
        request: Message,
        response: Message,
        proof: Proof,
        report: DeliveryReport,
    },
}

/// Counters kept across the loop lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages dequeued
    pub received: u64,

    /// Messages whose response reached the delivery stage
    pub delivered: u64,

    /// Messages the agent chose not to answer
    pub no_reply: u64,

    /// Messages dropped by a pipeline failure
    pub failed: u64,

    /// Individual output port failures
    pub delivery_failures: u64,
}

/// Single sequential consumer running the per-message pipeline
pub struct DispatchLoop {
    logic: Box<dyn AgentLogic>,
    history: Option<Arc<dyn HistoryProvider>>,
    memory: ShortTermMemory,
    proof_generator: Arc<dyn ProofGenerator>,
    proof_publisher: Arc<dyn ProofPublisher>,
    outputs: Vec<Arc<dyn OutputPort>>,
    stage: watch::Sender<DispatchStage>,
    stats: DispatchStats,
}

impl DispatchLoop {
    /// Create a loop around `logic` with digest proofs, a no-op publisher and
    /// no history or outputs
    pub fn new(logic: Box<dyn AgentLogic>) -> Self {
        let (stage, _) = watch::channel(DispatchStage::Waiting);
        Self {
            logic,
            history: None,
            memory: ShortTermMemory::default(),
            proof_generator: Arc::new(DigestProofGenerator::new()),
            proof_publisher: Arc::new(NoopProofPublisher),
            outputs: Vec::new(),
            stage,
            stats: DispatchStats::default(),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryProvider>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_memory(mut self, memory: ShortTermMemory) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_proof_generator(mut self, generator: Arc<dyn ProofGenerator>) -> Self {
        self.proof_generator = generator;
        self
    }

    pub fn with_proof_publisher(mut self, publisher: Arc<dyn ProofPublisher>) -> Self {
        self.proof_publisher = publisher;
        self
    }

    pub fn with_output(mut self, output: Arc<dyn OutputPort>) -> Self {
        self.outputs.push(output);
        self
    }

    /// Current pipeline stage
    pub fn stage(&self) -> DispatchStage {
        *self.stage.borrow()
    }

    /// Watch stage transitions
    pub fn subscribe_stage(&self) -> watch::Receiver<DispatchStage> {
        self.stage.subscribe()
    }

    pub fn memory(&self) -> &ShortTermMemory {
        &self.memory
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    fn set_stage(&self, stage: DispatchStage) {
        self.stage.send_replace(stage);
        debug!(%stage, "Dispatch stage");
    }

    /// Snapshot collaborator state. Only valid between cycles.
    pub fn export(&self) -> Result<RuntimeState, CheckpointError> {
        let mut state = RuntimeState::new();

        let memory = self.memory.to_value().map_err(CheckpointError::Encode)?;
        state.insert_section(MEMORY_SECTION, memory);

        let logic_state = self
            .logic
            .export_state()
            .map_err(|source| CheckpointError::Export {
                section: LOGIC_SECTION.to_string(),
                source,
            })?;
        if let Some(value) = logic_state {
            state.insert_section(LOGIC_SECTION, value);
        }

        Ok(state)
    }

    /// Load a snapshot produced by [`DispatchLoop::export`].
    ///
    /// Sections missing from `state` leave the matching collaborator at its
    /// current value.
    pub fn restore(&mut self, state: RuntimeState) -> Result<(), CheckpointError> {
        let RuntimeState { mut sections, .. } = state;

        if let Some(value) = sections.remove(MEMORY_SECTION) {
            self.memory =
                ShortTermMemory::from_value(value).map_err(|e| CheckpointError::Restore {
                    section: MEMORY_SECTION.to_string(),
                    source: e.into(),
                })?;
        }

        if let Some(value) = sections.remove(LOGIC_SECTION) {
            self.logic
                .restore_state(value)
                .map_err(|source| CheckpointError::Restore {
                    section: LOGIC_SECTION.to_string(),
                    source,
                })?;
        }

        for name in sections.keys() {
            warn!(section = %name, "Ignoring unknown checkpoint section");
        }

        Ok(())
    }

    /// Run the pipeline for one message.
    ///
    /// The stage is left at the last stage reached; [`DispatchLoop::handle`]
    /// resets it to `Waiting`.
    pub async fn process(&mut self, request: Message) -> Result<Outcome, DispatchError> {
        let original = request.clone();

        self.set_stage(DispatchStage::Enriching);
        let request = match &self.history {
            Some(history) => history
                .augment(request, &self.memory)
                .await
                .map_err(DispatchError::Enrichment)?,
            None => request,
        };

        self.set_stage(DispatchStage::Executing);
        let response = AssertUnwindSafe(self.logic.process(request.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!(
                    "Agent logic panicked: {}",
                    panic_message(&*panic)
                ))
            })
            .map_err(DispatchError::Execution)?;

        let Some(response) = response else {
            return Ok(Outcome::NoReply);
        };

        self.set_stage(DispatchStage::Proving);
        let proof = self
            .proof_generator
            .generate(&request, &response)
            .await
            .map_err(DispatchError::Proof)?;

        self.set_stage(DispatchStage::Publishing);
        self.proof_publisher
            .publish(&request, &response, &proof)
            .await
            .map_err(DispatchError::Publication)?;

        // Only exchanges that reach delivery are remembered. Memory keeps the
        // raw request so history is not nested on replay.
        self.memory.record(&original, &response);

        self.set_stage(DispatchStage::Delivering);
        let report = deliver(&self.outputs, &request, &response, &proof).await;

        Ok(Outcome::Delivered {
            request,
            response,
            proof,
            report,
        })
    }

    /// Process one message and report the result. Never fails; errors are
    /// logged and counted.
    pub async fn handle(&mut self, request: Message) -> Option<Outcome> {
        self.stats.received += 1;
        let conversation = request.conversation_id().unwrap_or("-").to_string();
        let span = info_span!("dispatch", cycle = %Uuid::new_v4(), %conversation);

        let result = self.process(request).instrument(span.clone()).await;
        let _guard = span.enter();

        let outcome = match result {
            Ok(Outcome::NoReply) => {
                self.stats.no_reply += 1;
                debug!("Agent produced no reply");
                Some(Outcome::NoReply)
            }
            Ok(Outcome::Delivered {
                request,
                response,
                proof,
                report,
            }) => {
                self.stats.delivered += 1;
                self.stats.delivery_failures += report.failures.len() as u64;

                for failure in &report.failures {
                    warn!(port = %failure.port, error = %failure.error, "Delivery failed");
                }
                if report.is_complete() {
                    info!(delivered = report.delivered.len(), %proof, "Response delivered");
                } else {
                    error!(
                        delivered = report.delivered.len(),
                        failed = report.failures.len(),
                        %proof,
                        "Response delivered with failures"
                    );
                }

                Some(Outcome::Delivered {
                    request,
                    response,
                    proof,
                    report,
                })
            }
            Err(e) => {
                self.stats.failed += 1;
                error!(stage = %e.stage(), error = %e, "Message dropped");
                None
            }
        };

        self.set_stage(DispatchStage::Waiting);
        outcome
    }

    fn handle_control(&self, control: Control) {
        match control {
            Control::Export(reply) => {
                let _ = reply.send(self.export());
            }
        }
    }

    /// Consume `queue` until `shutdown` fires or the queue is closed and
    /// drained. Returns the loop so its final state can be checkpointed.
    pub(crate) async fn run(
        mut self,
        mut queue: QueueReceiver,
        mut control: mpsc::Receiver<Control>,
        shutdown: CancellationToken,
    ) -> Self {
        info!(outputs = self.outputs.len(), "Dispatch loop started");
        self.set_stage(DispatchStage::Waiting);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping dispatch loop");
                    break;
                }
                Some(command) = control.recv() => self.handle_control(command),
                next = queue.recv() => match next {
                    Some(message) => {
                        self.handle(message).await;
                    }
                    None => {
                        info!("All input ports finished, stopping dispatch loop");
                        break;
                    }
                },
            }
        }

        queue.close();
        self.set_stage(DispatchStage::Stopped);
        info!(
            received = self.stats.received,
            delivered = self.stats.delivered,
            no_reply = self.stats.no_reply,
            failed = self.stats.failed,
            "Dispatch loop stopped"
        );
        self
    }
}

fn panic_message<'a>(panic: &'a (dyn Any + Send + 'static)) -> &'a str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Send to every port concurrently and wait for all of them
async fn deliver(
    outputs: &[Arc<dyn OutputPort>],
    request: &Message,
    response: &Message,
    proof: &Proof,
) -> DeliveryReport {
    let sends = outputs.iter().map(|port| async move {
        let result = port.send(request, response, proof).await;
        (port.name().to_string(), result)
    });

    let mut report = DeliveryReport {
        delivered: Vec::new(),
        failures: Vec::new(),
    };

    for (port, result) in join_all(sends).await {
        match result {
            Ok(()) => report.delivered.push(port),
            Err(error) => report.failures.push(DeliveryFailure { port, error }),
        }
    }

    report
}
