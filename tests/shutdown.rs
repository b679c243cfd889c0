//! Shutdown Integration Tests
//!
//! In-flight completion, stalled input ports and handle behavior after stop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_runtime::adapters::ScriptedClient;
use agent_runtime::collaborators::logic_fn;
use agent_runtime::core::{QueueSink, RuntimeError};
use agent_runtime::{DispatchStage, InputPort, Message, Runtime};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use common::upper;

/// Input port that never returns and never looks at the shutdown signal
struct StuckInput;

#[async_trait]
impl InputPort for StuckInput {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn start(&self, _sink: QueueSink, _shutdown: CancellationToken) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_in_flight_message_completes_after_shutdown() {
    let gate = Arc::new(Notify::new());
    let logic_gate = gate.clone();
    let logic = logic_fn(move |request: Message| {
        let gate = logic_gate.clone();
        async move {
            gate.notified().await;
            let content = request.content().to_uppercase();
            Ok::<_, anyhow::Error>(Some(request.reply(content)))
        }
    });

    let client = Arc::new(ScriptedClient::new(
        "client",
        vec![Message::new("first"), Message::new("second")],
    ));
    let runtime = Runtime::builder(Box::new(logic))
        .input(client.clone())
        .output(client.clone())
        .build();
    let handle = runtime.handle();
    let mut stage = handle.subscribe_stage();
    let task = tokio::spawn(runtime.run());

    assert_ok!(stage.wait_for(|s| *s == DispatchStage::Executing).await);
    handle.shutdown();
    gate.notify_one();

    let summary = assert_ok!(task.await.unwrap());

    // The in-flight message finished; nothing new was taken off the queue
    assert_eq!(summary.stats.received, 1);
    assert_eq!(summary.stats.delivered, 1);
    let deliveries = client.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].response.content(), "FIRST");
    assert_eq!(handle.stage(), DispatchStage::Stopped);
}

#[tokio::test]
async fn test_port_waiting_between_messages_stops_on_shutdown() {
    let client = Arc::new(
        ScriptedClient::new(
            "client",
            vec![Message::new("a"), Message::new("b"), Message::new("c")],
        )
        .with_interval(Duration::from_secs(60)),
    );
    let runtime = Runtime::builder(upper())
        .input(client.clone())
        .output(client.clone())
        .port_grace(Duration::from_secs(30))
        .build();
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());

    // The port is now sleeping before its second message
    client.wait_for_deliveries(1).await;
    handle.shutdown();

    // Well inside the grace period, so the port returned on its own
    let finished = tokio::time::timeout(Duration::from_secs(5), task).await;
    let summary = assert_ok!(assert_ok!(assert_ok!(finished)));

    assert_eq!(summary.stats.received, 1);
    let deliveries = client.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].response.content(), "A");
}

#[tokio::test]
async fn test_stuck_input_is_aborted_after_grace() {
    let runtime = Runtime::builder(upper())
        .input(Arc::new(StuckInput))
        .port_grace(Duration::from_millis(50))
        .build();
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());

    handle.shutdown();
    let finished = tokio::time::timeout(Duration::from_secs(5), task).await;
    let summary = assert_ok!(assert_ok!(assert_ok!(finished)));
    assert_eq!(summary.stats.received, 0);
}

#[tokio::test]
async fn test_shutdown_before_run_stops_immediately() {
    let client = Arc::new(ScriptedClient::new("client", vec![Message::new("x")]));
    let runtime = Runtime::builder(upper())
        .input(client.clone())
        .output(client.clone())
        .build();
    let handle = runtime.handle();

    handle.shutdown();
    assert!(handle.is_shutdown());
    let summary = assert_ok!(runtime.run().await);

    assert_eq!(summary.stats.received, 0);
    assert!(client.deliveries().is_empty());
}

#[tokio::test]
async fn test_handle_after_stop() {
    let runtime = Runtime::builder(upper()).build();
    let handle = runtime.handle();
    let waiter = handle.clone();

    let task = tokio::spawn(runtime.run());
    handle.shutdown();
    waiter.shutdown_requested().await;
    assert_ok!(task.await.unwrap());

    assert!(matches!(
        handle.export().await,
        Err(RuntimeError::NotRunning)
    ));
}
