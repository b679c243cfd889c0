//! Collaborator seams of the dispatch pipeline.
//!
//! The runtime calls these in a fixed order for every message:
//! history → agent logic → proof generation → proof publication.
//! Their internals are owned by the embedding application.

pub mod history;
pub mod memory;
pub mod proof;

use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Message, Proof};

pub use history::ConversationHistory;
pub use memory::{Exchange, ShortTermMemory};
pub use proof::{DigestProofGenerator, LogProofPublisher, NoopProofPublisher};

/// The user's agent: turns a request into an optional response.
///
/// Only the dispatch loop ever calls this, one message at a time, so
/// implementations may keep mutable state without locking.
#[async_trait]
pub trait AgentLogic: Send + Sync {
    /// Process one request. `Ok(None)` means no reply is warranted.
    async fn process(&mut self, request: Message) -> Result<Option<Message>>;

    /// State to include in checkpoints, if any
    fn export_state(&self) -> Result<Option<Value>> {
        Ok(None)
    }

    /// Reload state produced by [`AgentLogic::export_state`]
    fn restore_state(&mut self, _state: Value) -> Result<()> {
        Ok(())
    }
}

/// Enriches a request with conversation context before the agent sees it
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn augment(&self, request: Message, memory: &ShortTermMemory) -> Result<Message>;
}

/// Builds the integrity proof for a request/response pair
#[async_trait]
pub trait ProofGenerator: Send + Sync {
    async fn generate(&self, request: &Message, response: &Message) -> Result<Proof>;
}

/// Publishes a proof somewhere outside the runtime
#[async_trait]
pub trait ProofPublisher: Send + Sync {
    async fn publish(&self, request: &Message, response: &Message, proof: &Proof) -> Result<()>;
}

/// [`AgentLogic`] backed by a closure
pub struct LogicFn<F>(F);

/// Wrap an async closure as agent logic
///
/// ```
/// use agent_runtime::collaborators::logic_fn;
/// use agent_runtime::Message;
///
/// let upper = logic_fn(|request: Message| async move {
///     Ok::<_, anyhow::Error>(Some(request.reply(request.content().to_uppercase())))
/// });
/// # drop(upper);
/// ```
pub fn logic_fn<F, Fut>(f: F) -> LogicFn<F>
where
    F: FnMut(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Message>>> + Send,
{
    LogicFn(f)
}

#[async_trait]
impl<F, Fut> AgentLogic for LogicFn<F>
where
    F: FnMut(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Message>>> + Send,
{
    async fn process(&mut self, request: Message) -> Result<Option<Message>> {
        (self.0)(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logic_fn_keeps_state_between_calls() {
        let mut count = 0;
        let mut logic = logic_fn(move |request: Message| {
            count += 1;
            let n = count;
            async move { Ok::<_, anyhow::Error>(Some(request.reply(format!("#{}", n)))) }
        });

        let first = logic.process(Message::new("a")).await.unwrap().unwrap();
        let second = logic.process(Message::new("b")).await.unwrap().unwrap();

        assert_eq!(first.content(), "#1");
        assert_eq!(second.content(), "#2");
        assert!(logic.export_state().unwrap().is_none());
    }
}
