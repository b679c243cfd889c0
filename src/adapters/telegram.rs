//! Telegram Bot API adapter.
//!
//! As an input port it long-polls `getUpdates` and pushes every text message.
//! As an output port it answers in the chat the request came from, or in the
//! configured default chat.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::QueueSink;
use crate::domain::{Message, Proof};
use crate::ports::{InputPort, OutputPort};

/// Extra key carrying the originating chat id
pub const CHAT_ID_KEY: &str = "chat_id";

/// Extra key carrying the Telegram message id
pub const MESSAGE_ID_KEY: &str = "message_id";

/// Extra key carrying the sender's username
pub const AUTHOR_KEY: &str = "author";

const POLL_TIMEOUT_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram Bot API client
pub struct TelegramClient {
    /// Bot token
    bot_token: String,
    /// Chat used when a request carries no chat id
    default_chat_id: Option<String>,
    /// Next update offset for long polling
    offset: AtomicI64,
    /// HTTP client
    client: reqwest::Client,
}

/// Response from Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Message result from sendMessage
#[derive(Debug, Deserialize)]
struct MessageResult {
    message_id: i64,
}

/// One entry from getUpdates
#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    message_id: i64,
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    username: Option<String>,
}

/// Configuration for Telegram client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: Option<String>,
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new(bot_token: String, default_chat_id: Option<String>) -> Self {
        Self {
            bot_token,
            default_chat_id,
            offset: AtomicI64::new(0),
            client: reqwest::Client::new(),
        }
    }

    /// Create from config
    pub fn from_config(config: TelegramConfig) -> Self {
        Self::new(config.bot_token, config.chat_id)
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.bot_token, method
        )
    }

    /// Send a text message
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<i64> {
        let url = self.api_url("sendMessage");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
            }))
            .send()
            .await
            .context("Failed to send Telegram message")?;

        let result: TelegramResponse<MessageResult> = response
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            );
        }

        Ok(result.result.map(|r| r.message_id).unwrap_or(0))
    }

    /// Fetch pending updates, waiting up to the poll timeout for new ones
    async fn get_updates(&self) -> Result<Vec<Update>> {
        let url = self.api_url("getUpdates");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("offset", self.offset.load(Ordering::SeqCst).to_string()),
                ("timeout", POLL_TIMEOUT_SECS.to_string()),
            ])
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .send()
            .await
            .context("Failed to poll Telegram updates")?;

        let result: TelegramResponse<Vec<Update>> = response
            .json()
            .await
            .context("Failed to parse Telegram updates")?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            );
        }

        let updates = result.result.unwrap_or_default();
        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }
        Ok(updates)
    }

    /// Chat to answer `request` in
    fn reply_chat(&self, request: &Message) -> Option<String> {
        match request.extra_value(CHAT_ID_KEY) {
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(serde_json::Value::Number(id)) => Some(id.to_string()),
            _ => self.default_chat_id.clone(),
        }
    }
}

/// Convert an update into a runtime message. Bot authors and non-text
/// updates are skipped.
fn to_message(update: Update) -> Option<Message> {
    let incoming = update.message?;
    let text = incoming.text?;

    if incoming.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return None;
    }

    let mut message = Message::new(text)
        .with_conversation_id(format!("telegram:{}", incoming.chat.id))
        .with_extra(CHAT_ID_KEY, incoming.chat.id)
        .with_extra(MESSAGE_ID_KEY, incoming.message_id);

    if let Some(username) = incoming.from.and_then(|u| u.username) {
        message = message.with_extra(AUTHOR_KEY, username);
    }

    Some(message)
}

#[async_trait]
impl InputPort for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self, sink: QueueSink, shutdown: CancellationToken) -> Result<()> {
        loop {
            let updates = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                updates = self.get_updates() => updates,
            };

            match updates {
                Ok(updates) => {
                    for message in updates.into_iter().filter_map(to_message) {
                        if sink.push(message).await.is_err() {
                            debug!("Queue closed, telegram polling stopping");
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Telegram polling failed, backing off");
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl OutputPort for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, request: &Message, response: &Message, _proof: &Proof) -> Result<()> {
        let chat_id = self
            .reply_chat(request)
            .context("No Telegram chat to reply to")?;
        self.send_message(&chat_id, response.content()).await?;
        Ok(())
    }
}
