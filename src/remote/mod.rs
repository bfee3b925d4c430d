//! Remote object store clients.
//!
//! A remote store holds exactly one object (the JSON document) and offers two
//! primitives: fetch the bytes together with their content hash, and write new
//! bytes conditioned on the hash the writer last saw.

mod github;
mod memory;

pub use github::*;
pub use memory::*;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Bytes of the stored document and the store's version token for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub bytes: Vec<u8>,
    pub sha: String,
}

/// Acknowledgement of a successful write.
#[derive(Debug, Clone, Default)]
pub struct WriteReceipt {
    /// Content hash of the new version, when the store reports it
    pub sha: Option<String>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the current object. `Ok(None)` means the object does not exist
    /// yet, which is the normal first-run state.
    async fn fetch(&self) -> Result<Option<RemoteObject>>;

    /// Replace the object. `expected_sha` is the hash of the version the
    /// caller read (`None` when creating). A stale hash yields
    /// `AppError::Conflict`.
    async fn write(
        &self,
        bytes: &[u8],
        expected_sha: Option<&str>,
        message: &str,
    ) -> Result<WriteReceipt>;

    /// Human readable location, for logs.
    fn describe(&self) -> String;
}

/// Backoff for transient remote failures (rate limits, 5xx, network).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after that
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retrying after the zero-based `attempt` failed.
    ///
    /// A `Retry-After` hint from the store wins over the computed backoff.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint;
        }
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor)
    }
}
