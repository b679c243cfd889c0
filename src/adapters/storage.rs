//! Checkpoint store backends.
//!
//! - [`FileStore`]: one file per key in a local directory
//! - [`HttpStore`]: `PUT`/`GET`/`DELETE {base_url}/{key}` against a blob endpoint
//! - [`MemoryStore`]: process-local map, for tests and dry runs

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::fs;

use crate::core::CheckpointStore;

/// Stores each checkpoint as `<dir>/<key>`
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            anyhow::bail!("Invalid checkpoint key: '{}'", key);
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create checkpoint directory: {}", self.dir.display()))?;

        // Write to a temp file in the same directory, then rename over the target
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)
                .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
            tmp.write_all(&bytes).context("Failed to write checkpoint")?;
            tmp.as_file().sync_all().context("Failed to sync checkpoint")?;
            tmp.persist(&path)
                .with_context(|| format!("Failed to persist checkpoint: {}", path.display()))?;
            Ok(())
        })
        .await
        .context("Checkpoint write task failed")?
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read checkpoint: {}", path.display())),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete checkpoint: {}", path.display())),
        }
    }
}

/// Blob store reached over HTTP
pub struct HttpStore {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl CheckpointStore for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let url = self.object_url(key);
        let response = self
            .authorize(self.client.put(&url))
            .header("Content-Type", "application/json")
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("Failed to upload checkpoint to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Checkpoint upload rejected ({}): {}", status, text);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let url = self.object_url(key);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("Failed to download checkpoint from {}", url))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Checkpoint download rejected ({}): {}", status, text);
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read checkpoint body")?;
        Ok(Some(bytes.to_vec()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = self.object_url(key);
        let response = self
            .authorize(self.client.delete(&url))
            .send()
            .await
            .with_context(|| format!("Failed to delete checkpoint at {}", url))?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Checkpoint delete rejected ({}): {}", status, text);
        }
        Ok(())
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Raw bytes stored under `key`
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A poisoned map is still a valid map
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.lock().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
