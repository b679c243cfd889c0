//! Default proof collaborators.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::domain::{Message, Proof};

use super::{ProofGenerator, ProofPublisher};

/// SHA-256 over the JSON encoding of the (request, response) pair, hex encoded
#[derive(Debug, Clone, Default)]
pub struct DigestProofGenerator;

impl DigestProofGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Compute the digest synchronously
    pub fn digest(request: &Message, response: &Message) -> Result<String> {
        let bytes = serde_json::to_vec(&(request, response))
            .context("Failed to encode request/response for proof")?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl ProofGenerator for DigestProofGenerator {
    async fn generate(&self, request: &Message, response: &Message) -> Result<Proof> {
        Ok(Proof::new(Self::digest(request, response)?))
    }
}

/// Publisher that does nothing
#[derive(Debug, Clone, Default)]
pub struct NoopProofPublisher;

#[async_trait]
impl ProofPublisher for NoopProofPublisher {
    async fn publish(&self, _request: &Message, _response: &Message, _proof: &Proof) -> Result<()> {
        Ok(())
    }
}

/// Publisher that records each proof in the log
#[derive(Debug, Clone, Default)]
pub struct LogProofPublisher;

#[async_trait]
impl ProofPublisher for LogProofPublisher {
    async fn publish(&self, request: &Message, _response: &Message, proof: &Proof) -> Result<()> {
        info!(
            conversation = request.conversation_id().unwrap_or("-"),
            %proof,
            "Proof published"
        );
        Ok(())
    }
}
