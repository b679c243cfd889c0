//! Top-level runtime: wires input ports, the fan-in queue, the dispatch loop
//! and the checkpoint manager, and owns their lifetime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::collaborators::{AgentLogic, HistoryProvider, ProofGenerator, ProofPublisher, ShortTermMemory};
use crate::domain::{DispatchStage, RuntimeState};
use crate::ports::{InputPort, OutputPort};

use super::checkpoint::CheckpointManager;
use super::dispatch::{Control, DispatchLoop, DispatchStats};
use super::error::{CheckpointError, RuntimeError};
use super::queue::fan_in;

/// How long input ports get to stop after shutdown before being aborted
pub const DEFAULT_PORT_GRACE: Duration = Duration::from_secs(5);

const CONTROL_CAPACITY: usize = 8;

/// Builder for [`Runtime`]
pub struct RuntimeBuilder {
    dispatch: DispatchLoop,
    inputs: Vec<Arc<dyn InputPort>>,
    checkpoint: Option<CheckpointManager>,
    queue_capacity: Option<usize>,
    save_on_shutdown: bool,
    stop_when_inputs_done: bool,
    port_grace: Duration,
}

impl RuntimeBuilder {
    fn new(logic: Box<dyn AgentLogic>) -> Self {
        Self {
            dispatch: DispatchLoop::new(logic),
            inputs: Vec::new(),
            checkpoint: None,
            queue_capacity: None,
            save_on_shutdown: false,
            stop_when_inputs_done: false,
            port_grace: DEFAULT_PORT_GRACE,
        }
    }

    /// Register an input port
    pub fn input(mut self, port: Arc<dyn InputPort>) -> Self {
        self.inputs.push(port);
        self
    }

    /// Register an output port
    pub fn output(mut self, port: Arc<dyn OutputPort>) -> Self {
        self.dispatch = self.dispatch.with_output(port);
        self
    }

    /// Enrich every request with conversation history
    pub fn history(mut self, history: Arc<dyn HistoryProvider>) -> Self {
        self.dispatch = self.dispatch.with_history(history);
        self
    }

    /// Per-conversation memory size
    pub fn memory_capacity(mut self, capacity: usize) -> Self {
        self.dispatch = self.dispatch.with_memory(ShortTermMemory::new(capacity));
        self
    }

    pub fn proof_generator(mut self, generator: Arc<dyn ProofGenerator>) -> Self {
        self.dispatch = self.dispatch.with_proof_generator(generator);
        self
    }

    pub fn proof_publisher(mut self, publisher: Arc<dyn ProofPublisher>) -> Self {
        self.dispatch = self.dispatch.with_proof_publisher(publisher);
        self
    }

    /// Restore from and checkpoint to this store
    pub fn checkpoint(mut self, manager: CheckpointManager) -> Self {
        self.checkpoint = Some(manager);
        self
    }

    /// Bound the fan-in queue. Unbounded by default.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Upload the final state after the dispatch loop stops
    pub fn save_on_shutdown(mut self, enabled: bool) -> Self {
        self.save_on_shutdown = enabled;
        self
    }

    /// Stop once every input port has returned and the queue is drained,
    /// instead of waiting for an explicit shutdown
    pub fn stop_when_inputs_done(mut self, enabled: bool) -> Self {
        self.stop_when_inputs_done = enabled;
        self
    }

    /// Grace period for input ports after shutdown
    pub fn port_grace(mut self, grace: Duration) -> Self {
        self.port_grace = grace;
        self
    }

    pub fn build(self) -> Runtime {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let shutdown = CancellationToken::new();
        let stage = self.dispatch.subscribe_stage();

        let handle = RuntimeHandle {
            shutdown: shutdown.clone(),
            control: control_tx,
            stage,
            checkpoint: self.checkpoint.clone().map(Arc::new),
        };

        Runtime {
            dispatch: self.dispatch,
            inputs: self.inputs,
            checkpoint: self.checkpoint,
            queue_capacity: self.queue_capacity,
            save_on_shutdown: self.save_on_shutdown,
            stop_when_inputs_done: self.stop_when_inputs_done,
            port_grace: self.port_grace,
            shutdown,
            control_rx,
            handle,
        }
    }
}

/// The agent runtime. Build with [`Runtime::builder`], grab a
/// [`RuntimeHandle`], then [`Runtime::run`].
pub struct Runtime {
    dispatch: DispatchLoop,
    inputs: Vec<Arc<dyn InputPort>>,
    checkpoint: Option<CheckpointManager>,
    queue_capacity: Option<usize>,
    save_on_shutdown: bool,
    stop_when_inputs_done: bool,
    port_grace: Duration,
    shutdown: CancellationToken,
    control_rx: mpsc::Receiver<Control>,
    handle: RuntimeHandle,
}

/// What a finished run looked like
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: DispatchStats,

    /// State uploaded on shutdown, if any
    pub final_state: Option<RuntimeState>,
}

impl Runtime {
    pub fn builder(logic: Box<dyn AgentLogic>) -> RuntimeBuilder {
        RuntimeBuilder::new(logic)
    }

    /// Control handle, valid before, during and after [`Runtime::run`]
    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Restore state, start every input port, and consume the queue until
    /// shutdown.
    ///
    /// A checkpoint download failure aborts startup before any port runs.
    #[instrument(skip(self), fields(inputs = self.inputs.len()))]
    pub async fn run(self) -> Result<RunSummary, RuntimeError> {
        let Runtime {
            mut dispatch,
            inputs,
            checkpoint,
            queue_capacity,
            save_on_shutdown,
            stop_when_inputs_done,
            port_grace,
            shutdown,
            control_rx,
            handle: _,
        } = self;

        if let Some(manager) = &checkpoint {
            match manager.download().await? {
                Some(state) => {
                    dispatch.restore(state)?;
                    info!(key = manager.key(), "Runtime state restored");
                }
                None => info!(key = manager.key(), "No checkpoint found, starting fresh"),
            }
        }

        let (sink, queue) = fan_in(queue_capacity, shutdown.clone());

        let mut producers = JoinSet::new();
        for port in inputs {
            let sink = sink.clone();
            let token = shutdown.clone();
            producers.spawn(async move {
                let name = port.name().to_string();
                info!(port = %name, "Input port started");
                match port.start(sink, token).await {
                    Ok(()) => info!(port = %name, "Input port finished"),
                    Err(e) => error!(port = %name, error = %e, "Input port failed"),
                }
            });
        }

        // Holding a sink keeps the loop alive after every port returns
        let keep_alive = if stop_when_inputs_done {
            drop(sink);
            None
        } else {
            Some(sink)
        };

        let dispatch = tokio::spawn(dispatch.run(queue, control_rx, shutdown.clone()))
            .await
            .map_err(|e| RuntimeError::DispatchPanic(e.to_string()))?;

        shutdown.cancel();
        drop(keep_alive);
        stop_producers(&mut producers, port_grace).await;

        let mut final_state = None;
        if save_on_shutdown {
            if let Some(manager) = &checkpoint {
                let state = dispatch.export()?;
                manager.upload(&state).await?;
                final_state = Some(state);
            }
        }

        Ok(RunSummary {
            stats: dispatch.stats().clone(),
            final_state,
        })
    }
}

async fn stop_producers(producers: &mut JoinSet<()>, grace: Duration) {
    let drained = tokio::time::timeout(grace, async {
        while let Some(result) = producers.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(error = %e, "Input port panicked");
                }
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = producers.len(),
            "Input ports ignored shutdown, aborting"
        );
        producers.abort_all();
        while producers.join_next().await.is_some() {}
    }
}

/// Cloneable control handle for a [`Runtime`]
#[derive(Clone)]
pub struct RuntimeHandle {
    shutdown: CancellationToken,
    control: mpsc::Sender<Control>,
    stage: watch::Receiver<DispatchStage>,
    checkpoint: Option<Arc<CheckpointManager>>,
}

impl RuntimeHandle {
    /// Signal shutdown. Input ports stop, the in-flight message finishes,
    /// then the dispatch loop exits.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once shutdown has been signalled
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }

    /// Current dispatch stage
    pub fn stage(&self) -> DispatchStage {
        *self.stage.borrow()
    }

    /// Watch dispatch stage transitions
    pub fn subscribe_stage(&self) -> watch::Receiver<DispatchStage> {
        self.stage.clone()
    }

    /// Snapshot runtime state. Waits until the dispatch loop is between
    /// messages.
    pub async fn export(&self) -> Result<RuntimeState, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(Control::Export(tx))
            .await
            .map_err(|_| RuntimeError::NotRunning)?;

        let state = rx.await.map_err(|_| RuntimeError::NotRunning)??;
        Ok(state)
    }

    /// Export and upload state to the configured store
    pub async fn checkpoint(&self) -> Result<RuntimeState, RuntimeError> {
        let manager = self.checkpoint.as_ref().ok_or(CheckpointError::NoStore)?;
        let state = self.export().await?;
        manager.upload(&state).await?;
        Ok(state)
    }
}
