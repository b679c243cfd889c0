//! Dispatch Integration Tests
//!
//! Ordering, pipeline composition and delivery isolation, driven through the
//! public runtime with scripted ports.

mod common;

use std::sync::Arc;

use agent_runtime::adapters::ScriptedClient;
use agent_runtime::{Message, Proof, Runtime};
use tokio_test::assert_ok;

use common::{script, upper, upper_unless_skip, FailingOutput, FixedProof, SuffixHistory};

#[tokio::test]
async fn test_pipeline_composition() {
    let client = Arc::new(ScriptedClient::new("client", vec![Message::new("hi")]));
    let proofs = Arc::new(FixedProof::default());

    let runtime = Runtime::builder(upper())
        .input(client.clone())
        .output(client.clone())
        .history(Arc::new(SuffixHistory))
        .proof_generator(proofs.clone())
        .stop_when_inputs_done(true)
        .build();

    let summary = assert_ok!(runtime.run().await);
    assert_eq!(summary.stats.delivered, 1);

    let deliveries = client.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].request.content(), "hi[ctx]");
    assert_eq!(deliveries[0].response.content(), "HI[CTX]");
    assert_eq!(deliveries[0].proof, Proof::from("P"));
    assert_eq!(proofs.calls(), 1);
}

#[tokio::test]
async fn test_single_port_order_preserved() {
    let input = Arc::new(ScriptedClient::new("input", script("m", 50)));
    let output = Arc::new(ScriptedClient::new("output", Vec::new()));

    let runtime = Runtime::builder(upper())
        .input(input)
        .output(output.clone())
        .stop_when_inputs_done(true)
        .build();
    assert_ok!(runtime.run().await);

    let seen: Vec<String> = output
        .deliveries()
        .iter()
        .map(|d| d.request.content().to_string())
        .collect();
    let expected: Vec<String> = (0..50).map(|i| format!("m{}", i)).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_two_ports_keep_their_own_order() {
    let a = Arc::new(ScriptedClient::new("a", script("a", 100)));
    let b = Arc::new(ScriptedClient::new("b", script("b", 100)));
    let output = Arc::new(ScriptedClient::new("output", Vec::new()));

    let runtime = Runtime::builder(upper())
        .input(a)
        .input(b)
        .output(output.clone())
        .stop_when_inputs_done(true)
        .build();
    let summary = assert_ok!(runtime.run().await);
    assert_eq!(summary.stats.received, 200);

    let deliveries = output.deliveries();
    assert_eq!(deliveries.len(), 200);

    for prefix in ["a", "b"] {
        let indexes: Vec<usize> = deliveries
            .iter()
            .filter_map(|d| d.request.content().strip_prefix(prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(indexes, (0..100).collect::<Vec<_>>(), "port {}", prefix);
    }
}

#[tokio::test]
async fn test_no_reply_skips_proof_and_delivery() {
    let input = Arc::new(ScriptedClient::new(
        "input",
        vec![
            Message::new("one"),
            Message::new("skip me"),
            Message::new("two"),
        ],
    ));
    let output = Arc::new(ScriptedClient::new("output", Vec::new()));
    let proofs = Arc::new(FixedProof::default());

    let runtime = Runtime::builder(upper_unless_skip())
        .input(input)
        .output(output.clone())
        .proof_generator(proofs.clone())
        .stop_when_inputs_done(true)
        .build();
    let summary = assert_ok!(runtime.run().await);

    assert_eq!(summary.stats.received, 3);
    assert_eq!(summary.stats.no_reply, 1);
    assert_eq!(summary.stats.delivered, 2);
    assert_eq!(proofs.calls(), 2);

    let responses: Vec<String> = output
        .deliveries()
        .iter()
        .map(|d| d.response.content().to_string())
        .collect();
    assert_eq!(responses, vec!["ONE", "TWO"]);
}

#[tokio::test]
async fn test_failing_port_does_not_block_others() {
    let input = Arc::new(ScriptedClient::new("input", script("m", 5)));
    let good = Arc::new(ScriptedClient::new("good", Vec::new()));

    let runtime = Runtime::builder(upper())
        .input(input)
        .output(Arc::new(FailingOutput))
        .output(good.clone())
        .stop_when_inputs_done(true)
        .build();
    let summary = assert_ok!(runtime.run().await);

    assert_eq!(summary.stats.delivered, 5);
    assert_eq!(summary.stats.delivery_failures, 5);
    assert_eq!(summary.stats.failed, 0);
    assert_eq!(good.deliveries().len(), 5);
}

#[tokio::test]
async fn test_no_outputs_still_processes() {
    let input = Arc::new(ScriptedClient::new("input", script("m", 3)));
    let proofs = Arc::new(FixedProof::default());

    let runtime = Runtime::builder(upper())
        .input(input)
        .proof_generator(proofs.clone())
        .stop_when_inputs_done(true)
        .build();
    let summary = assert_ok!(runtime.run().await);

    assert_eq!(summary.stats.delivered, 3);
    assert_eq!(proofs.calls(), 3);
}

#[tokio::test]
async fn test_bounded_queue_delivers_everything() {
    let a = Arc::new(ScriptedClient::new("a", script("a", 40)));
    let b = Arc::new(ScriptedClient::new("b", script("b", 40)));
    let output = Arc::new(ScriptedClient::new("output", Vec::new()));

    let runtime = Runtime::builder(upper())
        .input(a)
        .input(b)
        .output(output.clone())
        .queue_capacity(2)
        .stop_when_inputs_done(true)
        .build();
    assert_ok!(runtime.run().await);

    assert_eq!(output.deliveries().len(), 80);
}
