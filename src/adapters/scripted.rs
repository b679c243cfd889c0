//! Scripted client: a fixed list of input messages and a record of every
//! delivered result. Useful for one-shot runs and tests.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::QueueSink;
use crate::domain::{Message, Proof};
use crate::ports::{InputPort, OutputPort};

/// One result received by a [`ScriptedClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub request: Message,
    pub response: Message,
    pub proof: Proof,
}

/// Input and output port driven by a script
pub struct ScriptedClient {
    name: String,
    script: Vec<Message>,
    interval: Option<Duration>,
    deliveries: Mutex<Vec<Delivery>>,
    delivered: watch::Sender<usize>,
}

impl ScriptedClient {
    pub fn new(name: impl Into<String>, script: Vec<Message>) -> Self {
        let (delivered, _) = watch::channel(0);
        Self {
            name: name.into(),
            script,
            interval: None,
            deliveries: Mutex::new(Vec::new()),
            delivered,
        }
    }

    /// Wait `interval` between pushes
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Everything delivered so far, in delivery order
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Resolve once at least `count` results were delivered
    pub async fn wait_for_deliveries(&self, count: usize) {
        let mut rx = self.delivered.subscribe();
        // The sender lives in self, so this cannot fail while we are borrowed
        let _ = rx.wait_for(|n| *n >= count).await;
    }
}

#[async_trait]
impl InputPort for ScriptedClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, sink: QueueSink, shutdown: CancellationToken) -> Result<()> {
        for (i, message) in self.script.iter().enumerate() {
            if i > 0 {
                if let Some(interval) = self.interval {
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }
            if shutdown.is_cancelled() || sink.push(message.clone()).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OutputPort for ScriptedClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: &Message, response: &Message, proof: &Proof) -> Result<()> {
        let count = {
            let mut deliveries = self.deliveries.lock().unwrap_or_else(|e| e.into_inner());
            deliveries.push(Delivery {
                request: request.clone(),
                response: response.clone(),
                proof: proof.clone(),
            });
            deliveries.len()
        };
        self.delivered.send_replace(count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fan_in;

    #[tokio::test]
    async fn test_pushes_script_in_order() {
        let shutdown = CancellationToken::new();
        let (sink, mut rx) = fan_in(None, shutdown.clone());
        let client = ScriptedClient::new("script", vec![Message::new("a"), Message::new("b")]);

        client.start(sink, shutdown).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().content(), "a");
        assert_eq!(rx.recv().await.unwrap().content(), "b");
        // Every sink dropped: queue drained and closed
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_records_deliveries() {
        let client = ScriptedClient::new("script", Vec::new());
        let request = Message::new("q");

        client
            .send(&request, &request.reply("r"), &Proof::from("p"))
            .await
            .unwrap();
        client.wait_for_deliveries(1).await;

        let deliveries = client.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].response.content(), "r");
    }
}
