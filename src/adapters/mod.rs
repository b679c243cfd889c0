//! Concrete adapters for external systems.
//!
//! - Input/output ports: cron, stdin/stdout, Telegram, webhook, scripted
//! - Agent logic: external command
//! - Checkpoint stores: local files, HTTP blob endpoint, memory

pub mod command;
pub mod cron;
pub mod scripted;
pub mod stdio;
pub mod storage;
pub mod telegram;
pub mod webhook;

pub use command::CommandLogic;
pub use cron::CronInput;
pub use scripted::{Delivery, ScriptedClient};
pub use stdio::{StdinInput, StdoutOutput};
pub use storage::{FileStore, HttpStore, MemoryStore};
pub use telegram::{TelegramClient, TelegramConfig};
pub use webhook::WebhookOutput;
