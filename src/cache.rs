//! In-process read cache for one document.
//!
//! Entries expire after `ttl`. For `write_grace` after a completed write the
//! cache is bypassed entirely, so readers see the remote's view of the new
//! version rather than a copy that raced with it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::store::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long a fetched document is served from memory
    pub ttl: Duration,
    /// Window after a write during which reads always go to the remote
    pub write_grace: Duration,
    /// Pause between a write and the confirming re-fetch
    pub settle_delay: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3),
            write_grace: Duration::from_secs(10),
            settle_delay: Duration::from_millis(800),
        }
    }
}

impl CachePolicy {
    /// Cache reads for `ttl`, with no grace window or settle delay.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            write_grace: Duration::ZERO,
            settle_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct CacheEntry<D> {
    snapshot: Snapshot<D>,
    fetched_at: Instant,
}

/// Result of `DocumentStore::cache_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u128>,
    /// True when there is nothing usable in the cache
    pub stale: bool,
}

#[derive(Debug)]
pub struct DocumentCache<D> {
    policy: CachePolicy,
    entry: Option<CacheEntry<D>>,
    last_write: Option<Instant>,
}

impl<D> DocumentCache<D> {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entry: None,
            last_write: None,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    fn in_write_grace(&self, now: Instant) -> bool {
        self.last_write
            .is_some_and(|at| now.saturating_duration_since(at) < self.policy.write_grace)
    }

    fn is_fresh(&self, entry: &CacheEntry<D>, now: Instant) -> bool {
        now.saturating_duration_since(entry.fetched_at) < self.policy.ttl
    }

    /// Cached snapshot, if still usable at `now`.
    pub fn lookup(&mut self, now: Instant) -> Option<Snapshot<D>> {
        if self.in_write_grace(now) {
            self.entry = None;
            return None;
        }
        let entry = self.entry.as_ref()?;
        if !self.is_fresh(entry, now) {
            return None;
        }
        Some(Snapshot {
            document: Arc::clone(&entry.snapshot.document),
            sha: entry.snapshot.sha.clone(),
            degraded: entry.snapshot.degraded,
        })
    }

    pub fn store(&mut self, snapshot: Snapshot<D>, now: Instant) {
        self.entry = Some(CacheEntry {
            snapshot,
            fetched_at: now,
        });
    }

    pub fn mark_write(&mut self, now: Instant) {
        self.last_write = Some(now);
        self.entry = None;
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn status(&self, now: Instant) -> CacheStatus {
        match &self.entry {
            Some(entry) => CacheStatus {
                cached: true,
                age_ms: Some(now.saturating_duration_since(entry.fetched_at).as_millis()),
                stale: !self.is_fresh(entry, now) || self.in_write_grace(now),
            },
            None => CacheStatus {
                cached: false,
                age_ms: None,
                stale: true,
            },
        }
    }
}
