use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{RemoteObject, RemoteStore, WriteReceipt};
use crate::error::{AppError, Result};

fn content_sha(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug, Default)]
struct MemoryState {
    object: Option<RemoteObject>,
    commits: Vec<String>,
}

/// In-process remote store with real compare-and-swap semantics.
///
/// Useful for testing and for running the CLI without repository access.
/// Latency is applied before the state is touched, so concurrent callers
/// interleave the way they would against a slow network store.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
    latency: Duration,
    fetches: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRemote {
    /// Create an empty store (fetch returns not-found).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `bytes`.
    pub fn with_content(bytes: impl Into<Vec<u8>>) -> Self {
        let remote = Self::new();
        remote.overwrite(bytes);
        remote
    }

    /// Delay every fetch and write by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Replace the content without a precondition, as another process would.
    pub fn overwrite(&self, bytes: impl Into<Vec<u8>>) {
        let bytes = bytes.into();
        let sha = content_sha(&bytes);
        if let Ok(mut state) = self.state.lock() {
            state.object = Some(RemoteObject { bytes, sha });
            state.commits.push("external write".to_string());
        }
    }

    /// Current content, if any.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.state
            .lock()
            .ok()?
            .object
            .as_ref()
            .map(|o| o.bytes.clone())
    }

    /// Current content hash, if any.
    pub fn sha(&self) -> Option<String> {
        self.state.lock().ok()?.object.as_ref().map(|o| o.sha.clone())
    }

    /// Commit messages of every accepted write, oldest first.
    pub fn commit_messages(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.commits.clone())
            .unwrap_or_default()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of write attempts, including rejected ones.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".into()))
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(&self) -> Result<Option<RemoteObject>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.lock()?.object.clone())
    }

    async fn write(
        &self,
        bytes: &[u8],
        expected_sha: Option<&str>,
        message: &str,
    ) -> Result<WriteReceipt> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock()?;
        let current = state.object.as_ref().map(|o| o.sha.as_str());
        if current != expected_sha {
            return Err(AppError::Conflict(format!(
                "expected {}, store holds {}",
                expected_sha.unwrap_or("no file"),
                current.unwrap_or("no file")
            )));
        }

        let sha = content_sha(bytes);
        state.object = Some(RemoteObject {
            bytes: bytes.to_vec(),
            sha: sha.clone(),
        });
        state.commits.push(message.to_string());
        Ok(WriteReceipt { sha: Some(sha) })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
