//! Default history collaborator.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::Message;

use super::{HistoryProvider, ShortTermMemory};

/// Prepends earlier exchanges of the same conversation to the request.
///
/// A request from a conversation with no memory passes through unchanged.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    max_exchanges: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ConversationHistory {
    pub fn new(max_exchanges: usize) -> Self {
        Self { max_exchanges }
    }

    fn render(&self, request: &Message, memory: &ShortTermMemory) -> Option<String> {
        let exchanges: Vec<_> = memory.recent(request).collect();
        if exchanges.is_empty() || self.max_exchanges == 0 {
            return None;
        }

        let skip = exchanges.len().saturating_sub(self.max_exchanges);
        let mut out = String::from("Conversation so far:\n");
        for exchange in &exchanges[skip..] {
            out.push_str(&format!("user: {}\n", exchange.request));
            out.push_str(&format!("agent: {}\n", exchange.response));
        }
        out.push_str("\nCurrent message:\n");
        out.push_str(request.content());
        Some(out)
    }
}

#[async_trait]
impl HistoryProvider for ConversationHistory {
    async fn augment(&self, request: Message, memory: &ShortTermMemory) -> Result<Message> {
        match self.render(&request, memory) {
            Some(content) => Ok(request.with_content(content)),
            None => Ok(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pass_through_without_memory() {
        let history = ConversationHistory::default();
        let request = Message::new("hi").with_conversation_id("c1");

        let augmented = history
            .augment(request.clone(), &ShortTermMemory::default())
            .await
            .unwrap();
        assert_eq!(augmented, request);
    }

    #[tokio::test]
    async fn test_prepends_recent_exchanges() {
        let mut memory = ShortTermMemory::default();
        let first = Message::new("what is rust?").with_conversation_id("c1");
        memory.record(&first, &first.reply("a language"));

        let history = ConversationHistory::default();
        let next = Message::new("is it fast?").with_conversation_id("c1");
        let augmented = history.augment(next, &memory).await.unwrap();

        assert_eq!(
            augmented.content(),
            "Conversation so far:\nuser: what is rust?\nagent: a language\n\nCurrent message:\nis it fast?"
        );
        assert_eq!(augmented.conversation_id(), Some("c1"));
    }

    #[tokio::test]
    async fn test_limits_exchanges() {
        let mut memory = ShortTermMemory::default();
        for i in 0..4 {
            let m = Message::new(format!("q{}", i));
            memory.record(&m, &m.reply(format!("a{}", i)));
        }

        let history = ConversationHistory::new(1);
        let augmented = history.augment(Message::new("now"), &memory).await.unwrap();

        assert!(augmented.content().contains("user: q3"));
        assert!(!augmented.content().contains("user: q2"));
    }
}
