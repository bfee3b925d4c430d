//! Cached, serialized access to one remote document.
//!
//! Reads are served from the cache when possible. Every mutation runs as a
//! transaction under the store's write lock: read the current document, let
//! the caller mutate a copy, write it back conditioned on the sha that was
//! read. Waiters acquire the lock in arrival order. A conflict (another
//! process wrote in between) re-runs the whole transaction from a fresh read.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::cache::{CachePolicy, CacheStatus, DocumentCache};
use crate::codec::{self, Document};
use crate::error::{AppError, Result};
use crate::remote::RemoteStore;

/// What a transaction closure wants done with its mutated copy.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Persist the document, then return the value.
    Commit(T),
    /// Discard any changes and return the value without writing.
    Skip(T),
}

/// A document together with the remote version it was read at.
#[derive(Debug, Clone)]
pub struct Snapshot<D> {
    pub document: Arc<D>,
    /// `None` when the remote object does not exist yet
    pub sha: Option<String>,
    /// Stored content was discarded while decoding. Transactions refuse to
    /// commit on top of a degraded snapshot.
    pub degraded: bool,
}

pub struct DocumentStore<D: Document> {
    remote: Arc<dyn RemoteStore>,
    cache: Mutex<DocumentCache<D>>,
    write_lock: tokio::sync::Mutex<()>,
    conflict_retries: u32,
}

impl<D: Document> DocumentStore<D> {
    pub fn new(remote: Arc<dyn RemoteStore>, policy: CachePolicy, conflict_retries: u32) -> Self {
        Self {
            remote,
            cache: Mutex::new(DocumentCache::new(policy)),
            write_lock: tokio::sync::Mutex::new(()),
            conflict_retries,
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    fn cache(&self) -> MutexGuard<'_, DocumentCache<D>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current document, from cache when fresh.
    pub async fn snapshot(&self) -> Result<Snapshot<D>> {
        let cached = self.cache().lookup(Instant::now());
        match cached {
            Some(snapshot) => {
                tracing::trace!(remote = %self.remote.describe(), "Document served from cache");
                Ok(snapshot)
            }
            None => self.fetch_fresh().await,
        }
    }

    pub async fn document(&self) -> Result<Arc<D>> {
        Ok(self.snapshot().await?.document)
    }

    /// Fetch from the remote regardless of cache state.
    pub async fn refresh(&self) -> Result<Snapshot<D>> {
        self.fetch_fresh().await
    }

    pub fn invalidate(&self) {
        self.cache().invalidate();
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.cache().status(Instant::now())
    }

    async fn fetch_fresh(&self) -> Result<Snapshot<D>> {
        let snapshot = match self.remote.fetch().await? {
            Some(object) => {
                tracing::debug!(
                    remote = %self.remote.describe(),
                    sha = %object.sha,
                    bytes = object.bytes.len(),
                    "Fetched document"
                );
                let decoded = codec::decode::<D>(&object.bytes);
                if decoded.degraded {
                    tracing::warn!(
                        remote = %self.remote.describe(),
                        sha = %object.sha,
                        "Document only partially readable, writes are blocked"
                    );
                }
                Snapshot {
                    document: Arc::new(decoded.document),
                    sha: Some(object.sha),
                    degraded: decoded.degraded,
                }
            }
            None => {
                tracing::info!(remote = %self.remote.describe(), "Document does not exist yet, starting empty");
                Snapshot {
                    document: Arc::new(D::default()),
                    sha: None,
                    degraded: false,
                }
            }
        };
        self.cache().store(snapshot.clone(), Instant::now());
        Ok(snapshot)
    }

    /// Run a read-mutate-write transaction.
    ///
    /// `mutate` may be called more than once: it is re-run against a fresh
    /// copy after each conflict, up to the configured number of retries.
    /// Errors returned by `mutate` abort the transaction without writing.
    /// A commit on top of a degraded snapshot fails with
    /// [`AppError::Invariant`] so the unreadable records are not lost.
    pub async fn transact<T, F>(&self, message: &str, mut mutate: F) -> Result<T>
    where
        F: FnMut(&mut D) -> Result<Outcome<T>> + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut conflicts = 0;

        loop {
            let snapshot = self.snapshot().await?;
            let mut document = D::clone(&snapshot.document);

            let value = match mutate(&mut document)? {
                Outcome::Commit(value) => value,
                Outcome::Skip(value) => return Ok(value),
            };

            if snapshot.degraded {
                tracing::error!(
                    remote = %self.remote.describe(),
                    commit = message,
                    "Refusing to overwrite a partially readable document"
                );
                return Err(AppError::Invariant(format!(
                    "stored document at {} could not be fully read, refusing to overwrite it",
                    self.remote.describe()
                )));
            }

            let bytes = codec::encode(&mut document, &*snapshot.document)?;
            match self
                .remote
                .write(&bytes, snapshot.sha.as_deref(), message)
                .await
            {
                Ok(receipt) => {
                    tracing::info!(
                        remote = %self.remote.describe(),
                        sha = receipt.sha.as_deref().unwrap_or_default(),
                        commit = message,
                        "Document written"
                    );
                    self.settle_after_write().await;
                    return Ok(value);
                }
                Err(e) if e.is_conflict() && conflicts < self.conflict_retries => {
                    conflicts += 1;
                    tracing::warn!(
                        remote = %self.remote.describe(),
                        attempt = conflicts,
                        commit = message,
                        "Write conflict, retrying from a fresh read"
                    );
                    self.invalidate();
                }
                Err(e) => {
                    tracing::error!(
                        remote = %self.remote.describe(),
                        error = %e,
                        commit = message,
                        "Document write failed"
                    );
                    self.invalidate();
                    return Err(e);
                }
            }
        }
    }

    async fn settle_after_write(&self) {
        let settle_delay = {
            let mut cache = self.cache();
            cache.mark_write(Instant::now());
            cache.policy().settle_delay
        };
        if !settle_delay.is_zero() {
            tokio::time::sleep(settle_delay).await;
        }
        if let Err(e) = self.fetch_fresh().await {
            tracing::warn!(
                remote = %self.remote.describe(),
                error = %e,
                "Re-fetch after write failed, cache left empty"
            );
            self.invalidate();
        }
    }
}
