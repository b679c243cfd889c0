//! Checkpoint manager: moves runtime state snapshots to and from a blob store.
//!
//! Snapshots are produced by the dispatch loop between cycles (see
//! [`DispatchLoop::export`](super::DispatchLoop::export)); this module only
//! encodes them and talks to the store. Nothing here is retried.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::RuntimeState;

use super::error::CheckpointError;

/// Default object key for a runtime deployment
pub const DEFAULT_CHECKPOINT_KEY: &str = "runtime_state.json";

/// Section holding [`AgentLogic`](crate::collaborators::AgentLogic) state
pub const LOGIC_SECTION: &str = "agent_logic";

/// Byte-oriented blob store for checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Human-readable store name
    fn name(&self) -> &str;

    /// Write `bytes` under `key`, replacing any previous object
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Read the object under `key`; `Ok(None)` when it does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove the object under `key`; missing objects are not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Uploads and downloads snapshots under one fixed key
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    key: String,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Manager using [`DEFAULT_CHECKPOINT_KEY`]
    pub fn with_default_key(store: Arc<dyn CheckpointStore>) -> Self {
        Self::new(store, DEFAULT_CHECKPOINT_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Encode and store a snapshot
    pub async fn upload(&self, state: &RuntimeState) -> Result<(), CheckpointError> {
        let bytes = state.to_bytes().map_err(CheckpointError::Encode)?;
        let size = bytes.len();

        self.store
            .put(&self.key, bytes)
            .await
            .map_err(|source| CheckpointError::Upload {
                key: self.key.clone(),
                source,
            })?;

        info!(
            store = self.store.name(),
            key = %self.key,
            bytes = size,
            sections = state.sections.len(),
            "Checkpoint uploaded"
        );
        Ok(())
    }

    /// Fetch and decode the stored snapshot. `Ok(None)` is a cold start.
    pub async fn download(&self) -> Result<Option<RuntimeState>, CheckpointError> {
        let bytes = self
            .store
            .get(&self.key)
            .await
            .map_err(|source| CheckpointError::Download {
                key: self.key.clone(),
                source,
            })?;

        let Some(bytes) = bytes else {
            debug!(store = self.store.name(), key = %self.key, "No checkpoint stored");
            return Ok(None);
        };

        let state = RuntimeState::from_bytes(&bytes).map_err(|source| CheckpointError::Decode {
            key: self.key.clone(),
            source,
        })?;

        info!(
            store = self.store.name(),
            key = %self.key,
            taken_at = %state.taken_at,
            "Checkpoint downloaded"
        );
        Ok(Some(state))
    }

    /// Remove the stored snapshot
    pub async fn clear(&self) -> Result<(), CheckpointError> {
        self.store
            .delete(&self.key)
            .await
            .map_err(|source| CheckpointError::Delete {
                key: self.key.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;

    #[tokio::test]
    async fn test_download_missing_is_cold_start() {
        let manager = CheckpointManager::with_default_key(Arc::new(MemoryStore::new()));
        assert!(manager.download().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let store = Arc::new(MemoryStore::new());
        let manager = CheckpointManager::new(store.clone(), "agent-1");

        let mut state = RuntimeState::new();
        state.insert_section("counter", serde_json::json!(3));
        manager.upload(&state).await.unwrap();

        assert!(store.contains("agent-1"));
        let loaded = manager.download().await.unwrap().unwrap();
        assert_eq!(loaded, state);

        manager.clear().await.unwrap();
        assert!(manager.download().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_is_decode_error() {
        let store = Arc::new(MemoryStore::new());
        store.put("k", b"not json".to_vec()).await.unwrap();

        let manager = CheckpointManager::new(store, "k");
        let err = manager.download().await.unwrap_err();
        assert!(matches!(err, CheckpointError::Decode { .. }));
    }
}
