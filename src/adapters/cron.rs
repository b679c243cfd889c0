//! Timer-driven input port.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::QueueSink;
use crate::domain::Message;
use crate::ports::InputPort;

/// Pushes one message per interval, starting immediately
pub struct CronInput {
    interval: Duration,
    content: String,
}

impl CronInput {
    /// Tick every `interval` with an empty message
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            content: String::new(),
        }
    }

    /// Use `content` as the body of every tick
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl InputPort for CronInput {
    fn name(&self) -> &str {
        "cron"
    }

    async fn start(&self, sink: QueueSink, shutdown: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            tick += 1;
            let message = Message::new(self.content.clone()).with_extra("cron_tick", tick);
            if sink.push(message).await.is_err() {
                debug!("Queue closed, cron stopping");
                return Ok(());
            }
        }
    }
}
