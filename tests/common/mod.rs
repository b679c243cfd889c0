//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use agent_runtime::collaborators::{logic_fn, ShortTermMemory};
use agent_runtime::{
    AgentLogic, CheckpointStore, HistoryProvider, Message, OutputPort, Proof, ProofGenerator,
};
use anyhow::Result;
use async_trait::async_trait;

/// Upper-cases the request content
pub fn upper() -> Box<dyn AgentLogic> {
    Box::new(logic_fn(|request: Message| async move {
        let content = request.content().to_uppercase();
        Ok::<_, anyhow::Error>(Some(request.reply(content)))
    }))
}

/// Upper-cases everything except requests starting with "skip"
pub fn upper_unless_skip() -> Box<dyn AgentLogic> {
    Box::new(logic_fn(|request: Message| async move {
        if request.content().starts_with("skip") {
            return Ok::<_, anyhow::Error>(None);
        }
        let content = request.content().to_uppercase();
        Ok(Some(request.reply(content)))
    }))
}

pub fn script(prefix: &str, count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| Message::new(format!("{}{}", prefix, i)))
        .collect()
}

/// Appends "[ctx]" to every request
pub struct SuffixHistory;

#[async_trait]
impl HistoryProvider for SuffixHistory {
    async fn augment(&self, request: Message, _memory: &ShortTermMemory) -> Result<Message> {
        let content = format!("{}[ctx]", request.content());
        Ok(request.with_content(content))
    }
}

/// Always produces the same proof and counts calls
#[derive(Default)]
pub struct FixedProof {
    pub calls: AtomicUsize,
}

impl FixedProof {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProofGenerator for FixedProof {
    async fn generate(&self, _request: &Message, _response: &Message) -> Result<Proof> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Proof::from("P"))
    }
}

/// Output port that rejects everything
pub struct FailingOutput;

#[async_trait]
impl OutputPort for FailingOutput {
    fn name(&self) -> &str {
        "failing"
    }

    async fn send(&self, _request: &Message, _response: &Message, _proof: &Proof) -> Result<()> {
        anyhow::bail!("port unavailable")
    }
}

/// Store whose reads always fail
pub struct BrokenStore;

#[async_trait]
impl CheckpointStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn put(&self, _key: &str, _bytes: Vec<u8>) -> Result<()> {
        anyhow::bail!("store offline")
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        anyhow::bail!("store offline")
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        anyhow::bail!("store offline")
    }
}
