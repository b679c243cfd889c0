//! The message envelope passed through the dispatch pipeline.
//!
//! Messages are immutable values. Enrichment never edits a message in place;
//! it builds a new one with [`Message::with_content`] and friends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single request or response flowing through the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,

    /// Adapter-defined keys (chat ids, author ids, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    extra: Map<String, Value>,
}

impl Message {
    /// Create a message with just content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            conversation_id: None,
            extra: Map::new(),
        }
    }

    /// Message text
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Conversation this message belongs to, if the adapter knows it
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Opaque adapter-defined fields
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Look up a single extra field
    pub fn extra_value(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Copy of this message with different content
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }

    /// Attach a conversation id
    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Attach an extra field, replacing any previous value under `key`
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Build a reply that keeps the conversation id and extra fields of `self`
    pub fn reply(&self, content: impl Into<String>) -> Self {
        self.with_content(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_content_leaves_original_untouched() {
        let original = Message::new("hi").with_conversation_id("c1");
        let enriched = original.with_content("hi[ctx]");

        assert_eq!(original.content(), "hi");
        assert_eq!(enriched.content(), "hi[ctx]");
        assert_eq!(enriched.conversation_id(), Some("c1"));
    }

    #[test]
    fn test_extra_fields() {
        let msg = Message::new("ping")
            .with_extra("chat_id", 42)
            .with_extra("author", "alice");

        assert_eq!(msg.extra_value("chat_id"), Some(&Value::from(42)));
        assert_eq!(msg.extra().len(), 2);
        assert!(msg.extra_value("missing").is_none());
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Message::new("x")).unwrap();
        assert_eq!(json, r#"{"content":"x"}"#);

        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Message::new("x"));
    }
}
