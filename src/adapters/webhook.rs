//! Webhook output: POSTs each result as JSON.
//!
//! Auth: optional Bearer token

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{Message, Proof};
use crate::ports::OutputPort;

/// Webhook client
pub struct WebhookOutput {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

/// Payload sent for every delivered result
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub request: &'a Message,
    pub response: &'a Message,
    pub proof: &'a Proof,
}

impl WebhookOutput {
    /// Create a new client
    pub fn new(endpoint: String, token: Option<String>) -> Self {
        Self {
            endpoint,
            token,
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OutputPort for WebhookOutput {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, request: &Message, response: &Message, proof: &Proof) -> Result<()> {
        let payload = WebhookPayload {
            request,
            response,
            proof,
        };

        let mut builder = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to POST to {}", self.endpoint))?;

        let status = response.status();
        if status.is_success() {
            // 202 Accepted is fine too
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Webhook error ({}): {}", status, text)
        }
    }
}
