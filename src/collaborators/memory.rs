//! Bounded short-term conversation memory.
//!
//! Owned by the dispatch loop and updated after every produced response, so
//! it is never touched concurrently. Exported as one checkpoint section.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Message;

/// Section name used in [`RuntimeState`](crate::domain::RuntimeState)
pub const MEMORY_SECTION: &str = "short_term_memory";

/// Key for messages without a conversation id
pub const DEFAULT_CONVERSATION: &str = "default";

/// Default number of exchanges kept per conversation
pub const DEFAULT_MEMORY_CAPACITY: usize = 20;

/// One request/response pair remembered for a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub request: String,
    pub response: String,
    pub at: DateTime<Utc>,
}

/// Recent exchanges, per conversation, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortTermMemory {
    capacity: usize,

    #[serde(default)]
    conversations: BTreeMap<String, VecDeque<Exchange>>,
}

impl Default for ShortTermMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

impl ShortTermMemory {
    /// Empty memory keeping at most `capacity` exchanges per conversation
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            conversations: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remember a completed exchange, evicting the oldest when full
    pub fn record(&mut self, request: &Message, response: &Message) {
        let key = conversation_key(request);
        let exchanges = self.conversations.entry(key.to_string()).or_default();

        exchanges.push_back(Exchange {
            request: request.content().to_string(),
            response: response.content().to_string(),
            at: Utc::now(),
        });

        while exchanges.len() > self.capacity {
            exchanges.pop_front();
        }
    }

    /// Exchanges of the conversation `message` belongs to, oldest first
    pub fn recent(&self, message: &Message) -> impl Iterator<Item = &Exchange> {
        self.conversations
            .get(conversation_key(message))
            .into_iter()
            .flat_map(|exchanges| exchanges.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Serialize for a checkpoint section
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Rebuild from a checkpoint section
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

fn conversation_key(message: &Message) -> &str {
    message.conversation_id().unwrap_or(DEFAULT_CONVERSATION)
}
