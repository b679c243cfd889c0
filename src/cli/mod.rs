//! Command-line interface for the agent runtime.
//!
//! Provides commands for running the runtime from configuration, inspecting
//! and clearing the stored checkpoint, and showing resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::adapters::{
    CommandLogic, CronInput, FileStore, HttpStore, ScriptedClient, StdinInput, StdoutOutput,
    TelegramClient, TelegramConfig, WebhookOutput,
};
use crate::collaborators::{logic_fn, AgentLogic, ConversationHistory, LogProofPublisher};
use crate::config::{self, CheckpointBackend, CheckpointSettings, ResolvedConfig};
use crate::core::{CheckpointManager, CheckpointStore, Runtime};
use crate::domain::Message;

/// agent-runtime - Fan-in agent execution runtime
#[derive(Parser, Debug)]
#[command(name = "agent-runtime")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file (skips .agent-runtime/config.yaml discovery)
    #[arg(short, long, global = true, env = "AGENT_RUNTIME_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the runtime with the configured ports
    Run {
        /// Process these messages once and exit instead of starting the
        /// configured inputs
        #[arg(short, long)]
        message: Vec<String>,

        /// Conversation id for --message input
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Inspect or clear the stored runtime state
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum CheckpointCommands {
    /// Print the stored runtime state
    Show,

    /// Delete the stored runtime state
    Clear,
}

impl Cli {
    /// Load configuration for this invocation
    pub fn load_config(&self) -> Result<ResolvedConfig> {
        match &self.config {
            Some(path) => config::load_config_from(Some(path)),
            None => config::config().cloned(),
        }
    }

    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = self.load_config()?;

        match self.command {
            Commands::Run {
                message,
                conversation,
            } => run_runtime(&cfg, message, conversation).await,
            Commands::Checkpoint { command } => match command {
                CheckpointCommands::Show => show_checkpoint(&cfg).await,
                CheckpointCommands::Clear => clear_checkpoint(&cfg).await,
            },
            Commands::Config => show_config(&cfg),
        }
    }
}

/// Read a secret from the environment variable the config names
fn secret(var: &str) -> Result<String> {
    std::env::var(var).with_context(|| format!("Environment variable {} is not set", var))
}

fn optional_secret(var: Option<&str>) -> Result<Option<String>> {
    var.map(secret).transpose()
}

/// Build the checkpoint store named by the config
pub fn checkpoint_manager(settings: &CheckpointSettings) -> Result<CheckpointManager> {
    let store: Arc<dyn CheckpointStore> = match &settings.backend {
        CheckpointBackend::File { dir } => Arc::new(FileStore::new(dir.clone())),
        CheckpointBackend::Http { url, token_env } => Arc::new(HttpStore::new(
            url.clone(),
            optional_secret(token_env.as_deref())?,
        )),
    };
    Ok(CheckpointManager::new(store, settings.key.clone()))
}

fn require_checkpoint(cfg: &ResolvedConfig) -> Result<CheckpointManager> {
    let settings = cfg
        .checkpoint
        .as_ref()
        .context("No checkpoint store configured (set checkpoint: in config.yaml or AGENT_RUNTIME_CHECKPOINT_DIR)")?;
    checkpoint_manager(settings)
}

fn telegram_client(cfg: &ResolvedConfig) -> Result<Arc<TelegramClient>> {
    let section = cfg
        .telegram
        .as_ref()
        .context("Telegram enabled but not configured")?;
    Ok(Arc::new(TelegramClient::from_config(TelegramConfig {
        bot_token: secret(&section.bot_token_env)?,
        chat_id: section.chat_id.clone(),
    })))
}

/// Configured logic, or an echo agent when none is set
fn agent_logic(cfg: &ResolvedConfig) -> Box<dyn AgentLogic> {
    match (&cfg.logic, cfg.logic_timeout()) {
        (Some(logic), Some(timeout)) => Box::new(CommandLogic::new(
            logic.command.clone(),
            logic.args.clone(),
            timeout,
        )),
        _ => {
            warn!("No logic configured, echoing requests");
            Box::new(logic_fn(|request: Message| async move {
                let content = request.content().to_string();
                Ok::<_, anyhow::Error>(Some(request.reply(content)))
            }))
        }
    }
}

/// Run the runtime until Ctrl-C, or until the one-shot messages are done
async fn run_runtime(
    cfg: &ResolvedConfig,
    messages: Vec<String>,
    conversation: Option<String>,
) -> Result<()> {
    let one_shot = !messages.is_empty();

    let mut builder = Runtime::builder(agent_logic(cfg))
        .memory_capacity(cfg.runtime.memory_capacity)
        .stop_when_inputs_done(one_shot);

    if cfg.runtime.history_exchanges > 0 {
        builder = builder.history(Arc::new(ConversationHistory::new(
            cfg.runtime.history_exchanges,
        )));
    }
    if cfg.runtime.log_proofs {
        builder = builder.proof_publisher(Arc::new(LogProofPublisher));
    }
    if let Some(capacity) = cfg.runtime.queue_capacity {
        builder = builder.queue_capacity(capacity);
    }
    if let Some(settings) = &cfg.checkpoint {
        builder = builder
            .checkpoint(checkpoint_manager(settings)?)
            .save_on_shutdown(settings.save_on_shutdown);
    }

    // Inputs
    let telegram = if cfg.inputs.telegram || cfg.outputs.telegram {
        Some(telegram_client(cfg)?)
    } else {
        None
    };

    if one_shot {
        let script = messages
            .into_iter()
            .map(|content| {
                let message = Message::new(content);
                match &conversation {
                    Some(id) => message.with_conversation_id(id.clone()),
                    None => message,
                }
            })
            .collect();
        builder = builder.input(Arc::new(ScriptedClient::new("cli", script)));
    } else {
        if cfg.inputs.stdin {
            builder = builder.input(Arc::new(StdinInput::new()));
        }
        if let Some(cron) = &cfg.inputs.cron {
            builder = builder.input(Arc::new(
                CronInput::new(Duration::from_secs(cron.interval_seconds))
                    .with_content(cron.content.clone()),
            ));
        }
        if cfg.inputs.telegram {
            if let Some(client) = &telegram {
                builder = builder.input(client.clone());
            }
        }
    }

    // Outputs
    // One-shot runs always print their answers
    if cfg.outputs.stdout || one_shot {
        builder = builder.output(Arc::new(StdoutOutput::new(cfg.outputs.show_proof)));
    }
    if cfg.outputs.telegram {
        if let Some(client) = &telegram {
            builder = builder.output(client.clone());
        }
    }
    if let Some(webhook) = &cfg.outputs.webhook {
        builder = builder.output(Arc::new(WebhookOutput::new(
            webhook.url.clone(),
            optional_secret(webhook.token_env.as_deref())?,
        )));
    }

    let runtime = builder.build();
    let handle = runtime.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            handle.shutdown();
        }
    });

    let summary = runtime.run().await?;

    info!(
        received = summary.stats.received,
        delivered = summary.stats.delivered,
        no_reply = summary.stats.no_reply,
        failed = summary.stats.failed,
        delivery_failures = summary.stats.delivery_failures,
        saved = summary.final_state.is_some(),
        "Runtime stopped"
    );

    Ok(())
}

/// Download and print the stored state
async fn show_checkpoint(cfg: &ResolvedConfig) -> Result<()> {
    let manager = require_checkpoint(cfg)?;

    match manager.download().await? {
        Some(state) => {
            println!("Store:    {}", manager.store_name());
            println!("Key:      {}", manager.key());
            println!("Version:  {}", state.version);
            println!("Taken at: {}", state.taken_at);
            println!("Sections: {}", state.sections.len());
            println!();
            println!("{}", serde_json::to_string_pretty(&state.sections)?);
        }
        None => println!("No checkpoint stored under '{}'", manager.key()),
    }

    Ok(())
}

async fn clear_checkpoint(cfg: &ResolvedConfig) -> Result<()> {
    let manager = require_checkpoint(cfg)?;
    manager.clear().await?;
    println!("Cleared checkpoint '{}' ({})", manager.key(), manager.store_name());
    Ok(())
}

fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("Agent Runtime Configuration");
    println!("===========================");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Home:        {}", cfg.home.display());
    println!();
    println!("Runtime:");
    println!(
        "  Queue capacity:    {}",
        cfg.runtime
            .queue_capacity
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unbounded".to_string())
    );
    println!("  Memory capacity:   {}", cfg.runtime.memory_capacity);
    println!("  History exchanges: {}", cfg.runtime.history_exchanges);
    println!("  Log proofs:        {}", cfg.runtime.log_proofs);
    println!();
    println!("Checkpoint:");
    match &cfg.checkpoint {
        Some(settings) => {
            match &settings.backend {
                CheckpointBackend::File { dir } => println!("  Backend: file ({})", dir.display()),
                CheckpointBackend::Http { url, .. } => println!("  Backend: http ({})", url),
            }
            println!("  Key:     {}", settings.key);
            println!("  Save on shutdown: {}", settings.save_on_shutdown);
        }
        None => println!("  (disabled)"),
    }
    println!();
    println!("Inputs:");
    println!("  stdin:    {}", cfg.inputs.stdin);
    println!("  telegram: {}", cfg.inputs.telegram);
    match &cfg.inputs.cron {
        Some(cron) => println!("  cron:     every {}s", cron.interval_seconds),
        None => println!("  cron:     off"),
    }
    println!();
    println!("Outputs:");
    println!("  stdout:   {}", cfg.outputs.stdout);
    println!("  telegram: {}", cfg.outputs.telegram);
    match &cfg.outputs.webhook {
        Some(webhook) => println!("  webhook:  {}", webhook.url),
        None => println!("  webhook:  off"),
    }
    println!();
    println!("Logic:");
    match &cfg.logic {
        Some(logic) => println!(
            "  {} {} (timeout {}s)",
            logic.command,
            logic.args.join(" "),
            logic.timeout_seconds
        ),
        None => println!("  (echo)"),
    }

    Ok(())
}
